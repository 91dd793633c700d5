//! Object references.
//!
//! An object reference names a data object or attribute in the server's
//! data model: `<LD>/<LN>.<DO>[.<SDO|DA>...][<FC>]`. On the wire MMS uses a
//! domain (the logical device) and an item built from the logical node, the
//! functional constraint and the remaining path separated by `$`.

use crate::error::{IedClientError, Result};
use crate::types::FunctionalConstraint;

/// Maximum length of an MMS domain name (logical device).
pub const MAX_DOMAIN_NAME_LENGTH: usize = 64;

/// Maximum length of an MMS item name.
pub const MAX_ITEM_NAME_LENGTH: usize = 128;

/// A parsed object reference with its optional functional constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectReference {
    element: String,
    fc: Option<FunctionalConstraint>,
}

impl ObjectReference {
    /// Parse `LD/LN.DO[.X...]` with an optional `[FC]` suffix.
    pub fn parse(text: &str) -> Result<Self> {
        let (element, fc) = match text.find('[') {
            None => (text, None),
            Some(open) => {
                let rest = &text[open + 1..];
                let close = rest.find(']').ok_or_else(|| {
                    IedClientError::object_reference_invalid(format!("{text}: missing ']'"))
                })?;
                if close + 1 != rest.len() {
                    return Err(IedClientError::object_reference_invalid(format!(
                        "{text}: trailing characters after FC"
                    )));
                }
                let fc = rest[..close].parse::<FunctionalConstraint>()?;
                (&text[..open], Some(fc))
            }
        };

        validate_element(element)?;

        Ok(Self {
            element: element.to_string(),
            fc,
        })
    }

    /// Build a reference without FC from an element name.
    pub fn new(element: &str) -> Result<Self> {
        validate_element(element)?;
        Ok(Self {
            element: element.to_string(),
            fc: None,
        })
    }

    /// The reference without the FC suffix.
    pub fn element(&self) -> &str {
        &self.element
    }

    /// The functional constraint, if one was given.
    pub fn fc(&self) -> Option<FunctionalConstraint> {
        self.fc
    }

    /// Logical device part.
    pub fn logical_device(&self) -> &str {
        self.element
            .split_once('/')
            .map_or(self.element.as_str(), |(ld, _)| ld)
    }

    /// Everything after the logical device: `LN.DO...`.
    fn node_path(&self) -> &str {
        self.element
            .split_once('/')
            .map_or("", |(_, path)| path)
    }

    /// Logical node part.
    pub fn logical_node(&self) -> &str {
        let path = self.node_path();
        path.split_once('.').map_or(path, |(ln, _)| ln)
    }

    /// MMS domain name.
    pub fn domain_id(&self) -> Result<String> {
        let domain = self.logical_device();
        if domain.len() > MAX_DOMAIN_NAME_LENGTH {
            return Err(IedClientError::object_reference_invalid(format!(
                "{}: logical device name longer than {MAX_DOMAIN_NAME_LENGTH}",
                self.element
            )));
        }
        Ok(domain.to_string())
    }

    /// MMS item name `LN$FC$DO$DA...` for the given FC.
    pub fn item_id(&self, fc: FunctionalConstraint) -> Result<String> {
        let path = self.node_path();
        let (ln, rest) = path.split_once('.').unwrap_or((path, ""));

        let mut item = String::with_capacity(path.len() + 4);
        item.push_str(ln);
        item.push('$');
        item.push_str(fc.as_str());
        for part in rest.split('.').filter(|p| !p.is_empty()) {
            item.push('$');
            item.push_str(part);
        }

        if item.len() > MAX_ITEM_NAME_LENGTH {
            return Err(IedClientError::object_reference_invalid(format!(
                "{}: MMS item name longer than {MAX_ITEM_NAME_LENGTH}",
                self.element
            )));
        }
        Ok(item)
    }

    /// Domain and item for the given FC, falling back to the parsed FC.
    pub fn mms_variable(&self, fc: Option<FunctionalConstraint>) -> Result<(String, String)> {
        let fc = fc.or(self.fc).ok_or_else(|| {
            IedClientError::object_reference_invalid(format!("{}: no functional constraint", self.element))
        })?;
        Ok((self.domain_id()?, self.item_id(fc)?))
    }
}

impl std::fmt::Display for ObjectReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.fc {
            Some(fc) => write!(f, "{}[{}]", self.element, fc),
            None => f.write_str(&self.element),
        }
    }
}

impl std::str::FromStr for ObjectReference {
    type Err = IedClientError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn validate_element(element: &str) -> Result<()> {
    let invalid = |why: &str| -> Result<()> {
        Err(IedClientError::object_reference_invalid(format!("{element}: {why}")))
    };

    let Some((ld, path)) = element.split_once('/') else {
        return invalid("missing '/' after logical device");
    };
    if ld.is_empty() {
        return invalid("empty logical device");
    }
    if path.contains('/') {
        return invalid("more than one '/'");
    }
    if !path.contains('.') {
        return invalid("missing '.' after logical node");
    }
    if path.split('.').any(str::is_empty) {
        return invalid("empty name segment");
    }
    if element.chars().any(|c| c.is_whitespace() || c == '$' || c == '[' || c == ']') {
        return invalid("illegal character");
    }
    Ok(())
}

/// Element name of a reference, i.e. everything before `[`.
pub fn element_name(text: &str) -> &str {
    text.split_once('[').map_or(text, |(element, _)| element)
}

/// FC suffix of a reference. Absent or unknown FC gives `None`.
pub fn functional_constraint(text: &str) -> Option<FunctionalConstraint> {
    let (_, rest) = text.split_once('[')?;
    let (code, _) = rest.split_once(']')?;
    code.parse().ok()
}

/// Map an MMS control variable (`LN$CO$DO[$SDO]$Oper`) back to the control
/// object reference `LD/LN.DO[.SDO]`.
pub fn control_reference_from_mms(domain: &str, item: &str) -> Option<String> {
    let mut parts = item.split('$');
    let ln = parts.next().filter(|s| !s.is_empty())?;
    if parts.next()? != "CO" {
        return None;
    }

    let rest: Vec<&str> = parts.collect();
    let (last, path) = rest.split_last()?;
    if !matches!(*last, "Oper" | "SBO" | "SBOw" | "Cancel") || path.is_empty() {
        return None;
    }

    Some(format!("{domain}/{ln}.{}", path.join(".")))
}
