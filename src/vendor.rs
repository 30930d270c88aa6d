//! Vendor records as returned by discovery and cached on disk.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// One vendor as described by discovery. Only `name` is required.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Vendor {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(
        default,
        alias = "form_url",
        skip_serializing_if = "Option::is_none"
    )]
    pub contact_form_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub services: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support_notes: Option<String>,
}

impl Vendor {
    #[allow(dead_code)]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Picks the channel used to reach this vendor. Email wins over a form;
    /// blank values count as missing.
    pub fn contact_method(&self) -> ContactMethod {
        if let Some(address) = non_blank(&self.email) {
            ContactMethod::Email {
                address: address.to_string(),
            }
        } else if let Some(url) = non_blank(&self.contact_form_url) {
            ContactMethod::Form {
                url: url.to_string(),
            }
        } else {
            ContactMethod::Unknown
        }
    }
}

// Models sometimes emit `null` where a string or list belongs.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// How a job reaches its vendor. Fixed when the job is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContactMethod {
    Email { address: String },
    Form { url: String },
    Unknown,
}

/// Registry key for a vendor job.
///
/// Built from the vendor's position in the discovery result plus a slug of
/// its name, so two vendors sharing a display name never collide.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VendorId(String);

impl VendorId {
    pub fn new(index: usize, name: &str) -> Self {
        let slug = slugify(name);
        if slug.is_empty() {
            Self(format!("{index:03}"))
        } else {
            Self(format!("{index:03}-{slug}"))
        }
    }

    #[allow(dead_code)]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VendorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lowercase ASCII alphanumerics separated by single dashes.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_wins_over_form() {
        let vendor = Vendor {
            email: Some("quotes@acme.test".into()),
            contact_form_url: Some("https://acme.test/quote".into()),
            ..Vendor::named("Acme")
        };
        assert_eq!(
            vendor.contact_method(),
            ContactMethod::Email {
                address: "quotes@acme.test".into()
            }
        );
    }

    #[test]
    fn form_used_when_email_blank() {
        let vendor = Vendor {
            email: Some("   ".into()),
            contact_form_url: Some("https://acme.test/quote".into()),
            ..Vendor::named("Acme")
        };
        assert_eq!(
            vendor.contact_method(),
            ContactMethod::Form {
                url: "https://acme.test/quote".into()
            }
        );
    }

    #[test]
    fn no_channel_is_unknown() {
        let vendor = Vendor {
            phone: Some("555-0100".into()),
            ..Vendor::named("Phone Only Plumbing")
        };
        assert_eq!(vendor.contact_method(), ContactMethod::Unknown);
    }

    #[test]
    fn vendor_ids_are_unique_for_shared_names() {
        let a = VendorId::new(0, "Best Windows");
        let b = VendorId::new(1, "Best Windows");
        assert_ne!(a, b);
        assert_eq!(a.as_str(), "000-best-windows");
    }

    #[test]
    fn slugify_collapses_punctuation() {
        assert_eq!(slugify("  Joe's  Pipes & Drains!! "), "joe-s-pipes-drains");
        assert_eq!(slugify("window replacement"), "window-replacement");
        assert_eq!(VendorId::new(7, "***").as_str(), "007");
    }

    #[test]
    fn deserializes_discovery_record_with_extras() {
        let json = r#"{
            "name": "Emerald City Plumbing",
            "phone": "206-555-0101",
            "form_url": "https://ecp.test/contact",
            "services": ["drain cleaning"],
            "rating": 4.8
        }"#;
        let vendor: Vendor = serde_json::from_str(json).unwrap();
        assert_eq!(vendor.name, "Emerald City Plumbing");
        assert_eq!(
            vendor.contact_form_url.as_deref(),
            Some("https://ecp.test/contact")
        );
        assert_eq!(vendor.services, vec!["drain cleaning".to_string()]);
        assert!(vendor.email.is_none());
    }
}
