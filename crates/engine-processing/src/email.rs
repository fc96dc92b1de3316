use model::contact::{EmailAction, EmailType};

/// One mailbox row as it currently exists in the target system.
#[derive(Debug, Clone, PartialEq)]
pub struct ExistingEmail {
    pub email: String,
    pub email_type: EmailType,
    pub is_primary: bool,
}

/// Where the emails of one employee should end up. Addresses are compared
/// case-insensitively; a business address equal to the private one is
/// dropped, the target keeps a single row in that case.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DesiredEmails {
    pub business: Option<String>,
    pub private: Option<String>,
}

impl DesiredEmails {
    fn incoming(&self) -> Vec<(EmailType, String)> {
        let private = self
            .private
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_lowercase);
        let business = self
            .business
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_lowercase)
            .filter(|b| private.as_deref() != Some(b.as_str()));

        let mut incoming = Vec::new();
        if let Some(email) = private {
            incoming.push((EmailType::Private, email));
        }
        if let Some(email) = business {
            incoming.push((EmailType::Business, email));
        }
        incoming
    }
}

/// One concrete email mutation, ready for payload building.
#[derive(Debug, Clone, PartialEq)]
pub struct EmailActionItem {
    pub action: EmailAction,
    pub email: String,
    pub email_type: EmailType,
    pub is_primary: bool,
}

/// Diffs the desired mailbox set against the existing one and returns the
/// mutations in safe submission order: demote, delete, type move, promote,
/// insert. A promote subsumes the insert of the same address.
pub fn reconcile(desired: &DesiredEmails, existing: &[ExistingEmail]) -> Vec<EmailActionItem> {
    let mut inserts: Vec<(String, EmailType)> = Vec::new();
    let mut deletes: Vec<(String, EmailType)> = Vec::new();
    let mut type_moves: Vec<(String, EmailType)> = Vec::new();
    let mut promote: Option<(String, EmailType)> = None;
    let mut demote: Option<(String, EmailType)> = None;

    let find_by_email = |email: &str| {
        existing
            .iter()
            .find(|e| e.email.eq_ignore_ascii_case(email))
    };
    let current_primary = existing.iter().find(|e| e.is_primary);

    // Private first: a business decision taken later overrides the primary
    // choice, business addresses win the primary slot.
    for (email_type, email) in desired.incoming() {
        let by_email = find_by_email(&email);
        let by_type = existing.iter().find(|e| e.email_type == email_type);

        match by_email {
            Some(row) if row.email_type != email_type => {
                type_moves.push((email.clone(), email_type));
            }
            Some(_) => {}
            None => inserts.push((email.clone(), email_type)),
        }
        if let Some(row) = by_type {
            if !row.email.eq_ignore_ascii_case(&email) {
                deletes.push((row.email.clone(), email_type));
            }
        }

        match email_type {
            EmailType::Business => {
                let already_primary = by_email.is_some_and(|e| e.is_primary);
                if !already_primary {
                    promote = Some((email.clone(), EmailType::Business));
                }
                if let Some(primary) = current_primary {
                    if !primary.email.eq_ignore_ascii_case(&email) {
                        demote = Some((primary.email.clone(), primary.email_type));
                    }
                }
            }
            EmailType::Private => {
                let business_exists = existing
                    .iter()
                    .any(|e| e.email_type == EmailType::Business);
                let already_primary = by_email.is_some_and(|e| e.is_primary);
                if !business_exists && !already_primary {
                    promote = Some((email.clone(), EmailType::Private));
                }
            }
        }
    }

    let mut items = Vec::new();
    if let Some((email, email_type)) = demote {
        items.push(EmailActionItem {
            action: EmailAction::Demote,
            email,
            email_type,
            is_primary: false,
        });
    }
    for (email, email_type) in deletes {
        items.push(EmailActionItem {
            action: EmailAction::Delete,
            email,
            email_type,
            is_primary: false,
        });
    }
    for (email, email_type) in type_moves {
        items.push(EmailActionItem {
            action: EmailAction::UpdateType,
            email,
            email_type,
            is_primary: false,
        });
    }
    if let Some((email, email_type)) = &promote {
        items.push(EmailActionItem {
            action: EmailAction::Promote,
            email: email.clone(),
            email_type: *email_type,
            is_primary: true,
        });
    }
    for (email, email_type) in inserts {
        let subsumed = promote
            .as_ref()
            .is_some_and(|(p_email, p_type)| p_email.eq_ignore_ascii_case(&email) && *p_type == email_type);
        if subsumed {
            continue;
        }
        items.push(EmailActionItem {
            action: EmailAction::Insert,
            email,
            email_type,
            is_primary: email_type == EmailType::Business,
        });
    }
    finalize(items)
}

/// Sorts by submission order and drops duplicates.
pub fn finalize(mut items: Vec<EmailActionItem>) -> Vec<EmailActionItem> {
    items.sort_by_key(|item| item.action.submission_rank());
    let mut seen: Vec<(EmailAction, String, EmailType, bool)> = Vec::new();
    items.retain(|item| {
        let key = (
            item.action,
            item.email.to_lowercase(),
            item.email_type,
            item.is_primary,
        );
        if seen.contains(&key) {
            false
        } else {
            seen.push(key);
            true
        }
    });
    items
}
