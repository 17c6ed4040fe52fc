// ── Credentials ──
//
// Credentials are looked up by identifier and filtered by category
// (`"ssh"`, `"power"`, ...). Secrets stay wrapped in `SecretString`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use secrecy::SecretString;

use crate::error::CoreError;

#[derive(Debug)]
pub struct Credential {
    pub identifier: String,
    pub categories: Vec<String>,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub keyfile: Option<PathBuf>,
}

impl Credential {
    pub fn new(identifier: impl Into<String>, categories: &[&str]) -> Self {
        Self {
            identifier: identifier.into(),
            categories: categories.iter().map(|c| (*c).to_owned()).collect(),
            username: None,
            password: None,
            keyfile: None,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_password(mut self, password: SecretString) -> Self {
        self.password = Some(password);
        self
    }

    pub fn with_keyfile(mut self, keyfile: impl Into<PathBuf>) -> Self {
        self.keyfile = Some(keyfile.into());
        self
    }

    pub fn has_category(&self, category: &str) -> bool {
        self.categories.iter().any(|c| c == category)
    }
}

/// All credentials known to a landscape, keyed by identifier.
#[derive(Debug, Default, Clone)]
pub struct CredentialTable {
    by_id: BTreeMap<String, Arc<Credential>>,
}

impl CredentialTable {
    pub fn from_credentials(credentials: Vec<Credential>) -> Result<Self, CoreError> {
        let mut by_id = BTreeMap::new();
        for cred in credentials {
            if by_id.contains_key(&cred.identifier) {
                return Err(CoreError::configuration(format!(
                    "Duplicate credential identifier '{}'.",
                    cred.identifier
                )));
            }
            by_id.insert(cred.identifier.clone(), Arc::new(cred));
        }
        Ok(Self { by_id })
    }

    pub fn get(&self, identifier: &str) -> Option<Arc<Credential>> {
        self.by_id.get(identifier).cloned()
    }

    /// Look up every identifier a resource declares.
    pub fn resolve(
        &self,
        identifiers: &[String],
    ) -> Result<BTreeMap<String, Arc<Credential>>, CoreError> {
        let mut resolved = BTreeMap::new();
        let mut missing = Vec::new();

        for id in identifiers {
            match self.by_id.get(id) {
                Some(cred) => {
                    resolved.insert(id.clone(), Arc::clone(cred));
                }
                None => missing.push(id.as_str()),
            }
        }

        if missing.is_empty() {
            Ok(resolved)
        } else {
            Err(CoreError::configuration(format!(
                "Undefined credentials referenced: {}",
                missing.join(", ")
            )))
        }
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.by_id.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn resolve_reports_every_missing_identifier() {
        let table = CredentialTable::from_credentials(vec![
            Credential::new("lab-ssh", &["ssh"]).with_username("tester"),
        ])
        .unwrap();

        assert_eq!(table.resolve(&["lab-ssh".into()]).unwrap().len(), 1);

        let err = table
            .resolve(&["lab-ssh".into(), "pdu".into(), "bmc".into()])
            .unwrap_err();
        assert!(err.to_string().contains("pdu, bmc"));
    }

    #[test]
    fn duplicate_identifiers_are_rejected() {
        let err = CredentialTable::from_credentials(vec![
            Credential::new("a", &["ssh"]),
            Credential::new("a", &["power"]),
        ])
        .unwrap_err();
        assert!(err.is_configuration());
    }
}
