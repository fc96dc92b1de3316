use crate::email::DesiredEmails;
use engine_core::cache::ReferenceCaches;
use model::record::EmployeeRecord;
use sha2::{Digest, Sha256};

/// Decides which email addresses an employee gets in the target system.
///
/// Real addresses are personal data; outside an allow-list of HR users the
/// engine writes a deterministic pseudonymous address on the corporate
/// domain instead. Addresses already on the corporate domain are kept so
/// repeated runs stay idempotent.
#[derive(Debug, Clone)]
pub struct EmailPolicy {
    corporate_domain: String,
}

impl EmailPolicy {
    /// `corporate_domain` without the leading `@`, e.g. `corp.example`.
    pub fn new(corporate_domain: impl Into<String>) -> EmailPolicy {
        EmailPolicy {
            corporate_domain: corporate_domain.into().trim_start_matches('@').to_lowercase(),
        }
    }

    pub fn pseudonymous_address(&self, userid: &str) -> String {
        let digest = Sha256::digest(userid.trim().to_lowercase().as_bytes());
        format!("user{:x}@{}", digest, self.corporate_domain)
    }

    fn is_corporate(&self, email: &str) -> bool {
        email
            .to_lowercase()
            .ends_with(&format!("@{}", self.corporate_domain))
    }

    fn is_exempt(&self, caches: &ReferenceCaches, userid: &str) -> bool {
        let key = userid.trim().to_lowercase();
        let contains = |set: &std::collections::BTreeSet<String>| {
            set.iter().any(|u| u.trim().to_lowercase() == key)
        };
        contains(&caches.hr_global_users) || contains(&caches.anonymization_exempt)
    }

    /// Resolves the desired mailbox set for one employee.
    pub fn resolve(&self, record: &EmployeeRecord, caches: &ReferenceCaches) -> DesiredEmails {
        let lower = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(str::to_lowercase)
        };

        if self.is_exempt(caches, &record.userid) {
            return DesiredEmails {
                business: lower(&record.email),
                private: lower(&record.private_email),
            };
        }

        let target_primary = caches
            .emails_of(&record.userid)
            .into_iter()
            .find(|row| row.is_primary)
            .map(|row| row.email_address.trim().to_lowercase());

        if let Some(primary) = &target_primary {
            if self.is_corporate(primary) {
                // Already pseudonymized on an earlier run.
                return DesiredEmails {
                    business: Some(primary.clone()),
                    private: None,
                };
            }
        }

        let pseudonym = self.pseudonymous_address(&record.userid);
        DesiredEmails {
            business: target_primary.or_else(|| Some(pseudonym.clone())),
            private: Some(pseudonym),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::cache::EmailRow;
    use model::contact::EmailType;

    fn record(userid: &str, email: Option<&str>, private_email: Option<&str>) -> EmployeeRecord {
        EmployeeRecord {
            userid: userid.into(),
            email: email.map(str::to_string),
            private_email: private_email.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn pseudonymous_address_is_deterministic_and_case_insensitive() {
        let policy = EmailPolicy::new("corp.example");
        let a = policy.pseudonymous_address("U100");
        let b = policy.pseudonymous_address("u100");
        assert_eq!(a, b);
        assert!(a.starts_with("user"));
        assert!(a.ends_with("@corp.example"));
        assert_ne!(a, policy.pseudonymous_address("u200"));
    }

    #[test]
    fn exempt_users_keep_their_real_addresses() {
        let policy = EmailPolicy::new("@corp.example");
        let mut caches = ReferenceCaches::default();
        caches.hr_global_users.insert("u100".into());
        let resolved = policy.resolve(
            &record("u100", Some("Jane@Work.com"), Some("jane@home.net")),
            &caches,
        );
        assert_eq!(resolved.business.as_deref(), Some("jane@work.com"));
        assert_eq!(resolved.private.as_deref(), Some("jane@home.net"));
    }

    #[test]
    fn corporate_primary_is_kept_untouched() {
        let policy = EmailPolicy::new("corp.example");
        let mut caches = ReferenceCaches::default();
        caches.emails.push(EmailRow {
            person_id_external: "u100".into(),
            email_address: "userabc@corp.example".into(),
            email_type: EmailType::Business,
            is_primary: true,
        });
        let resolved = policy.resolve(&record("u100", Some("jane@work.com"), None), &caches);
        assert_eq!(resolved.business.as_deref(), Some("userabc@corp.example"));
        assert_eq!(resolved.private, None);
    }

    #[test]
    fn foreign_primary_is_reused_as_business_next_to_pseudonym() {
        let policy = EmailPolicy::new("corp.example");
        let mut caches = ReferenceCaches::default();
        caches.emails.push(EmailRow {
            person_id_external: "u100".into(),
            email_address: "jane@elsewhere.org".into(),
            email_type: EmailType::Business,
            is_primary: true,
        });
        let resolved = policy.resolve(&record("u100", None, None), &caches);
        assert_eq!(resolved.business.as_deref(), Some("jane@elsewhere.org"));
        assert_eq!(
            resolved.private.as_deref(),
            Some(policy.pseudonymous_address("u100").as_str())
        );
    }

    #[test]
    fn unknown_user_gets_pseudonym_for_both_slots() {
        let policy = EmailPolicy::new("corp.example");
        let caches = ReferenceCaches::default();
        let resolved = policy.resolve(&record("u100", Some("jane@work.com"), None), &caches);
        let pseudonym = policy.pseudonymous_address("u100");
        assert_eq!(resolved.business.as_deref(), Some(pseudonym.as_str()));
        assert_eq!(resolved.private.as_deref(), Some(pseudonym.as_str()));
    }
}
