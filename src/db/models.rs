use serde::{Deserialize, Serialize};

/// Identity delivered by the authentication backend on sign-in.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Identity {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub name: String,
    pub picture: Option<String>,
    #[serde(default)]
    pub niches: Vec<String>,
    #[serde(default)]
    pub is_complete: bool,
}

impl UserProfile {
    /// Fresh, incomplete profile for a first-time sign-in.
    pub fn from_identity(identity: &Identity) -> Self {
        let name = identity
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| {
                identity
                    .email
                    .split('@')
                    .next()
                    .unwrap_or_default()
                    .to_string()
            });
        Self {
            id: identity.id.clone(),
            email: identity.email.clone(),
            name,
            picture: identity.picture.clone(),
            niches: Vec::new(),
            is_complete: false,
        }
    }

    /// Default niche used to seed the generator form.
    pub fn primary_niche(&self) -> Option<&str> {
        self.niches.first().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_name_falls_back_to_email_local_part() {
        let identity = Identity {
            id: "u1".into(),
            email: "barista@example.com".into(),
            name: None,
            picture: None,
        };
        let profile = UserProfile::from_identity(&identity);
        assert_eq!(profile.name, "barista");
        assert!(!profile.is_complete);
        assert!(profile.primary_niche().is_none());
    }
}
