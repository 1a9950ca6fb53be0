//! Board settings: which document server a board's documents open in.

use chrono::{DateTime, Duration, Utc};

/// Length of the per-team trial on the shared demo document server.
pub const DEMO_PERIOD_DAYS: i64 = 30;

/// Trial state, shared by all boards of a team.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Demo {
    pub enabled: bool,
    pub started: Option<DateTime<Utc>>,
}

impl Demo {
    /// Whether the trial is enabled and still inside its window at `now`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        match self.started {
            Some(started) if self.enabled => now < started + Duration::days(DEMO_PERIOD_DAYS),
            _ => false,
        }
    }
}

/// Stored settings for one `(team_id, board_id)`.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub address: String,
    pub header: String,
    pub secret: String,
    /// Set once the board moved off the demo server onto its own.
    pub demo_detached: bool,
    pub demo: Demo,
}

impl Settings {
    /// Resolve the document server a board should use.
    ///
    /// Boards with a complete own configuration use it. Otherwise a team whose
    /// trial is active falls back to the demo server, if one is configured.
    pub fn document_server(
        &self,
        now: DateTime<Utc>,
        demo_server: Option<&DocServerTarget>,
    ) -> Option<DocServerTarget> {
        if !self.address.is_empty() && !self.header.is_empty() && !self.secret.is_empty() {
            return Some(DocServerTarget {
                address: self.address.clone(),
                header: self.header.clone(),
                secret: self.secret.clone(),
            });
        }
        if !self.demo_detached && self.demo.is_active(now) {
            return demo_server.cloned();
        }
        None
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("address", &self.address)
            .field("header", &self.header)
            .field("secret", &"<redacted>")
            .field("demo_detached", &self.demo_detached)
            .field("demo", &self.demo)
            .finish()
    }
}

/// Connection details for a document server.
#[derive(Clone, PartialEq, Eq)]
pub struct DocServerTarget {
    pub address: String,
    /// Header the signed request token is sent in (e.g. `Authorization`).
    pub header: String,
    /// Shared secret the document server verifies request tokens with.
    pub secret: String,
}

impl std::fmt::Debug for DocServerTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocServerTarget")
            .field("address", &self.address)
            .field("header", &self.header)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo_server() -> DocServerTarget {
        DocServerTarget {
            address: "https://demo.example".into(),
            header: "Authorization".into(),
            secret: "demo".into(),
        }
    }

    #[test]
    fn own_configuration_wins() {
        let settings = Settings {
            address: "https://ds.example".into(),
            header: "Authorization".into(),
            secret: "s3cr3t".into(),
            ..Default::default()
        };
        let target = settings.document_server(Utc::now(), Some(&demo_server())).unwrap();
        assert_eq!(target.address, "https://ds.example");
    }

    #[test]
    fn incomplete_configuration_is_not_configured() {
        let settings = Settings {
            address: "https://ds.example".into(),
            ..Default::default()
        };
        assert!(settings.document_server(Utc::now(), None).is_none());
    }

    #[test]
    fn active_demo_uses_demo_server() {
        let now = Utc::now();
        let settings = Settings {
            demo: Demo {
                enabled: true,
                started: Some(now - Duration::days(3)),
            },
            ..Default::default()
        };
        let target = settings.document_server(now, Some(&demo_server())).unwrap();
        assert_eq!(target.address, "https://demo.example");
    }

    #[test]
    fn expired_or_detached_demo_is_not_configured() {
        let now = Utc::now();
        let expired = Settings {
            demo: Demo {
                enabled: true,
                started: Some(now - Duration::days(DEMO_PERIOD_DAYS + 1)),
            },
            ..Default::default()
        };
        assert!(expired.document_server(now, Some(&demo_server())).is_none());

        let detached = Settings {
            demo_detached: true,
            demo: Demo {
                enabled: true,
                started: Some(now),
            },
            ..Default::default()
        };
        assert!(detached.document_server(now, Some(&demo_server())).is_none());
    }
}
