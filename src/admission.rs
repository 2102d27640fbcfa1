//! # Admission Module
//!
//! Applica la quota per identità prima che i file raggiungano il registry.
//!
//! ## Policy:
//! - Utente anonimo: 5 file per batch
//! - Utente autenticato: 30 file per batch
//! - I file di tipo non supportato vengono scartati prima della quota
//! - Oltre la quota il set accettato viene troncato (non rifiutato) e i file
//!   esclusi vengono riportati come `OverQuota`
//!
//! La stessa selezione vale per file già in memoria (`plan`) e per semplici
//! percorsi (`screen`), così i file oltre la quota non vengono mai letti.

use crate::config::Config;
use crate::error::ConvertError;
use crate::identity::IdentityInfo;
use crate::job::{JobId, SourceFile};
use crate::registry::{JobRegistry, RejectReason, RejectedFile};
use serde::Serialize;
use tracing::{info, warn};

/// Per-identity batch size limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionPolicy {
    pub anonymous_quota: usize,
    pub authenticated_quota: usize,
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self {
            anonymous_quota: 5,
            authenticated_quota: 30,
        }
    }
}

impl From<&Config> for AdmissionPolicy {
    fn from(config: &Config) -> Self {
        Self {
            anonymous_quota: config.anonymous_quota,
            authenticated_quota: config.authenticated_quota,
        }
    }
}

/// Items split into what goes to the registry and what was left out
#[derive(Debug)]
pub struct AdmissionPlan<T = SourceFile> {
    pub quota: usize,
    pub accepted: Vec<T>,
    pub rejected: Vec<RejectedFile>,
}

/// What the user is told after an admission
#[derive(Debug, Clone, Default, Serialize)]
pub struct AdmissionReport {
    pub quota: usize,
    pub accepted: Vec<JobId>,
    pub rejected: Vec<RejectedFile>,
}

impl AdmissionReport {
    /// Number of valid files dropped because of the quota
    pub fn dropped_over_quota(&self) -> usize {
        self.rejected
            .iter()
            .filter(|r| matches!(r.reason, RejectReason::OverQuota { .. }))
            .count()
    }

    pub fn unsupported(&self) -> usize {
        self.rejected
            .iter()
            .filter(|r| matches!(r.reason, RejectReason::UnsupportedType { .. }))
            .count()
    }
}

impl AdmissionPolicy {
    pub fn quota_for(&self, identity: &IdentityInfo) -> usize {
        if identity.authenticated {
            self.authenticated_quota
        } else {
            self.anonymous_quota
        }
    }

    /// Filter unsupported types, then cap the remainder to the identity quota
    pub fn plan(&self, files: Vec<SourceFile>, identity: &IdentityInfo) -> AdmissionPlan {
        self.screen(files, identity, |file| {
            (file.name.clone(), file.mime_type.clone())
        })
    }

    /// Same selection as `plan` for any item that can name itself and its
    /// declared mime type
    pub fn screen<T>(
        &self,
        items: Vec<T>,
        identity: &IdentityInfo,
        describe: impl Fn(&T) -> (String, String),
    ) -> AdmissionPlan<T> {
        let quota = self.quota_for(identity);
        let mut plan = AdmissionPlan {
            quota,
            accepted: Vec::new(),
            rejected: Vec::new(),
        };

        for item in items {
            let (name, mime) = describe(&item);
            if !JobRegistry::is_accepted_type(&mime) {
                plan.rejected.push(RejectedFile {
                    name,
                    reason: RejectReason::UnsupportedType { mime },
                });
            } else if plan.accepted.len() >= quota {
                plan.rejected.push(RejectedFile {
                    name,
                    reason: RejectReason::OverQuota { quota },
                });
            } else {
                plan.accepted.push(item);
            }
        }

        let dropped = plan
            .rejected
            .iter()
            .filter(|r| matches!(r.reason, RejectReason::OverQuota { .. }))
            .count();
        if dropped > 0 {
            warn!(
                "Quota of {} file(s) reached for {}: dropped {} file(s)",
                quota,
                identity.display_name.as_deref().unwrap_or("anonymous user"),
                dropped
            );
        } else {
            info!("Admission plan: {} file(s) within quota {}", plan.accepted.len(), quota);
        }

        plan
    }
}

/// Error for a plan that admitted nothing: the first unsupported file if
/// any, otherwise the quota
pub fn rejection_error(rejected: &[RejectedFile], quota: usize) -> ConvertError {
    let unsupported = rejected.iter().find_map(|r| match &r.reason {
        RejectReason::UnsupportedType { mime } => Some(ConvertError::InvalidInput {
            name: r.name.clone(),
            mime: mime.clone(),
        }),
        RejectReason::OverQuota { .. } => None,
    });

    unsupported.unwrap_or(ConvertError::QuotaExceeded {
        quota,
        dropped: rejected.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jpeg(name: &str) -> SourceFile {
        SourceFile::new(name, "image/jpeg", 0, vec![0u8; 8])
    }

    #[test]
    fn test_quota_selection() {
        let policy = AdmissionPolicy::default();
        assert_eq!(policy.quota_for(&IdentityInfo::default()), 5);
        assert_eq!(
            policy.quota_for(&IdentityInfo {
                authenticated: true,
                display_name: Some("ana".to_string()),
            }),
            30
        );
    }

    #[test]
    fn test_over_quota_is_truncated() {
        let policy = AdmissionPolicy::default();
        let files = (0..8).map(|i| jpeg(&format!("{}.jpg", i))).collect();
        let plan = policy.plan(files, &IdentityInfo::default());

        assert_eq!(plan.accepted.len(), 5);
        assert_eq!(plan.rejected.len(), 3);
        assert_eq!(plan.accepted[4].name, "4.jpg");
        assert!(plan
            .rejected
            .iter()
            .all(|r| r.reason == RejectReason::OverQuota { quota: 5 }));
    }

    #[test]
    fn test_within_quota_has_no_drops() {
        let policy = AdmissionPolicy::default();
        let files = (0..5).map(|i| jpeg(&format!("{}.jpg", i))).collect();
        let plan = policy.plan(files, &IdentityInfo::default());

        assert_eq!(plan.accepted.len(), 5);
        assert!(plan.rejected.is_empty());
    }

    #[test]
    fn test_unsupported_types_do_not_consume_quota() {
        let policy = AdmissionPolicy {
            anonymous_quota: 2,
            authenticated_quota: 30,
        };
        let files = vec![
            SourceFile::new("icon.svg", "image/svg+xml", 0, vec![0u8; 4]),
            jpeg("a.jpg"),
            jpeg("b.jpg"),
        ];
        let plan = policy.plan(files, &IdentityInfo::default());

        assert_eq!(plan.accepted.len(), 2);
        assert_eq!(plan.rejected.len(), 1);
        assert_eq!(plan.rejected[0].name, "icon.svg");
    }

    #[test]
    fn test_screen_paths_without_contents() {
        let policy = AdmissionPolicy {
            anonymous_quota: 2,
            authenticated_quota: 30,
        };
        let paths = vec!["a.png", "notes.txt", "b.gif", "c.jpg"];
        let plan = policy.screen(paths, &IdentityInfo::default(), |path| {
            let mime = if path.ends_with(".txt") { "text/plain" } else { "image/png" };
            (path.to_string(), mime.to_string())
        });

        assert_eq!(plan.accepted, vec!["a.png", "b.gif"]);
        assert_eq!(
            plan.rejected[0].reason,
            RejectReason::UnsupportedType {
                mime: "text/plain".to_string()
            }
        );
        assert_eq!(plan.rejected[1].name, "c.jpg");
        assert_eq!(plan.rejected[1].reason, RejectReason::OverQuota { quota: 2 });
    }

    #[test]
    fn test_rejection_error_prefers_unsupported_type() {
        let over = RejectedFile {
            name: "a.jpg".to_string(),
            reason: RejectReason::OverQuota { quota: 0 },
        };
        let svg = RejectedFile {
            name: "b.svg".to_string(),
            reason: RejectReason::UnsupportedType {
                mime: "image/svg+xml".to_string(),
            },
        };

        assert!(matches!(
            rejection_error(&[over.clone(), svg], 0),
            ConvertError::InvalidInput { name, .. } if name == "b.svg"
        ));
        assert!(matches!(
            rejection_error(&[over], 0),
            ConvertError::QuotaExceeded { quota: 0, dropped: 1 }
        ));
    }
}
