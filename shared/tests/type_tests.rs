/// Integration-level tests for the `shared` crate.
///
/// Each section tests one module; unit tests that are tightly coupled to
/// private helpers live inside the modules themselves (see `#[cfg(test)]`
/// blocks in `qr.rs` and `server_config.rs`).
// ---------------------------------------------------------------------------
// Subject ids
// ---------------------------------------------------------------------------
#[cfg(test)]
mod subject_tests {
    use shared::types::*;

    #[test]
    fn session_and_attendance_subjects_compose() {
        let session = SubjectId::session("42").unwrap();
        assert_eq!(session.as_str(), "session-42");

        let attendance = SubjectId::attendance(&session, "ff-7").unwrap();
        assert_eq!(attendance.to_string(), "session-42:ff-7");
    }

    #[test]
    fn subject_json_is_a_plain_string() {
        let s = SubjectId::parse("session-42").unwrap();
        assert_eq!(serde_json::to_string(&s).unwrap(), "\"session-42\"");
    }

    #[test]
    fn invalid_subject_is_rejected_on_deserialize() {
        assert!(serde_json::from_str::<SubjectId>("\"\"").is_err());
        assert!(serde_json::from_str::<SubjectId>("\"John Smith\"").is_err());
        let long = format!("\"{}\"", "a".repeat(MAX_SUBJECT_ID_LEN + 1));
        assert!(serde_json::from_str::<SubjectId>(&long).is_err());
    }
}

// ---------------------------------------------------------------------------
// Claims
// ---------------------------------------------------------------------------
#[cfg(test)]
mod claims_tests {
    use shared::types::*;

    fn sample_claims() -> QrClaims {
        QrClaims {
            subject_id: SubjectId::parse("session-42").unwrap(),
            issued_at: 1_700_000_000_000,
            expires_at: 1_700_000_300_000,
            nonce: "AAECAwQFBgcICQoLDA0ODw".to_string(),
        }
    }

    #[test]
    fn claims_json_uses_short_keys() {
        let json = serde_json::to_value(sample_claims()).unwrap();
        assert_eq!(json["sub"], "session-42");
        assert_eq!(json["iat_ms"], 1_700_000_000_000_i64);
        assert_eq!(json["exp_ms"], 1_700_000_300_000_i64);
        assert!(json.get("jti").is_some());
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let c = sample_claims();
        assert!(!c.is_expired_at(c.expires_at));
        assert!(c.is_expired_at(c.expires_at + 1));
    }

    #[test]
    fn redeem_response_copies_claims() {
        let c = sample_claims();
        let resp = RedeemResponse::from(&c);
        assert_eq!(resp.subject_id, "session-42");
        assert_eq!(resp.issued_at, c.issued_at);
        assert_eq!(resp.expires_at, c.expires_at);
    }
}

// ---------------------------------------------------------------------------
// Error codes
// ---------------------------------------------------------------------------
#[cfg(test)]
mod error_code_tests {
    use shared::types::*;

    #[test]
    fn codes_are_stable_strings() {
        assert_eq!(
            serde_json::to_string(&QrErrorCode::Invalid).unwrap(),
            "\"QR_INVALID\""
        );
        assert_eq!(
            serde_json::to_string(&QrErrorCode::Expired).unwrap(),
            "\"QR_EXPIRED\""
        );
        assert_eq!(
            serde_json::to_string(&QrErrorCode::AlreadyUsed).unwrap(),
            "\"QR_ALREADY_USED\""
        );
    }

    #[test]
    fn every_code_has_a_message() {
        for code in QrErrorCode::ALL {
            assert!(!code.to_message().is_empty());
            assert_eq!(code.to_string(), code.as_str());
        }
    }

    #[test]
    fn error_response_from_code() {
        let resp = ErrorResponse::from(QrErrorCode::AlreadyUsed);
        assert_eq!(resp.status, "error");
        assert_eq!(resp.code, "QR_ALREADY_USED");
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"code\":\"QR_ALREADY_USED\""));
    }
}

// ---------------------------------------------------------------------------
// Gateway wire types
// ---------------------------------------------------------------------------
#[cfg(test)]
mod wire_tests {
    use shared::types::*;

    #[test]
    fn issue_request_defaults() {
        let req: IssueRequest = serde_json::from_str(r#"{"subject_id":"session-42"}"#).unwrap();
        assert_eq!(req.class, TokenClass::Session);
        assert!(req.ttl_secs.is_none());
    }

    #[test]
    fn issue_request_attendance_class() {
        let req: IssueRequest = serde_json::from_str(
            r#"{"subject_id":"session-42:ff-7","class":"attendance","ttl_secs":120}"#,
        )
        .unwrap();
        assert_eq!(req.class, TokenClass::Attendance);
        assert_eq!(req.ttl_secs, Some(120));
    }

    #[test]
    fn status_response_serializes_null_used_at() {
        let resp = StatusResponse {
            subject_id: "session-42".into(),
            issued_at: 1,
            expires_at: 2,
            used: false,
            used_at: None,
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["used"], false);
        assert!(json["used_at"].is_null());
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------
#[cfg(test)]
mod config_tests {
    use std::io::Write;
    use std::time::Duration;

    use shared::config::{LiveConfig, load_config, parse_config};
    use shared::types::*;

    const VALID: &str = r#"
        [server]
        bind = "127.0.0.1"
        port_client = 4337

        [database]
        path = "replay.db"

        [qr]
        session_ttl_secs = 600
        attendance_ttl_secs = 300
        max_ttl_secs = 3600
        secret = "0123456789abcdef0123456789abcdef"
    "#;

    #[test]
    fn load_config_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(VALID.as_bytes()).unwrap();

        let config = load_config(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.server.client_addr(), "127.0.0.1:4337");
        assert_eq!(config.server.admin_addr(), "127.0.0.1:1338");
        assert_eq!(config.qr.ttl_for(TokenClass::Session), Duration::from_secs(600));
        assert_eq!(config.qr.max_ttl(), Duration::from_secs(3600));
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(
            load_config("/definitely/not/here/config.toml"),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn empty_and_malformed_files_are_rejected() {
        assert!(matches!(parse_config("   "), Err(ConfigError::InvalidConfig(_))));
        assert!(matches!(parse_config("[server"), Err(ConfigError::TomlParse(_))));
    }

    #[test]
    fn class_ttl_above_max_is_rejected() {
        let bad = VALID.replace("session_ttl_secs = 600", "session_ttl_secs = 7200");
        assert!(matches!(parse_config(&bad), Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let bad = VALID.replace("attendance_ttl_secs = 300", "attendance_ttl_secs = 0");
        assert!(matches!(parse_config(&bad), Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn short_secret_is_rejected() {
        if std::env::var(SECRET_ENV_VAR).is_ok() {
            return;
        }
        let bad = VALID.replace("0123456789abcdef0123456789abcdef", "too-short");
        assert!(matches!(parse_config(&bad), Err(ConfigError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn live_config_reload_is_seen_by_clones() {
        let live = LiveConfig::new(parse_config(VALID).unwrap());
        let handle = live.clone();

        let updated = parse_config(&VALID.replace("attendance_ttl_secs = 300", "attendance_ttl_secs = 120")).unwrap();
        live.reload(updated).await.unwrap();

        assert_eq!(
            handle.read().await.qr.ttl_for(TokenClass::Attendance),
            Duration::from_secs(120)
        );
    }

    #[tokio::test]
    async fn reload_cannot_outgrow_running_max_ttl() {
        let live = LiveConfig::new(parse_config(VALID).unwrap());

        let raised = parse_config(
            &VALID
                .replace("max_ttl_secs = 3600", "max_ttl_secs = 7200")
                .replace("session_ttl_secs = 600", "session_ttl_secs = 5000"),
        )
        .unwrap();
        assert!(matches!(
            live.reload(raised).await,
            Err(ConfigError::InvalidConfig(_))
        ));

        let config = live.read().await;
        assert_eq!(config.qr.session_ttl_secs, 600);
        assert_eq!(config.qr.max_ttl_secs, 3600);
    }

    #[tokio::test]
    async fn reload_keeps_startup_only_values() {
        let live = LiveConfig::new(parse_config(VALID).unwrap());

        let moved = parse_config(
            &VALID
                .replace("max_ttl_secs = 3600", "max_ttl_secs = 7200")
                .replace("session_ttl_secs = 600", "session_ttl_secs = 1200")
                .replace("port_client = 4337", "port_client = 5337")
                .replace("replay.db", "other.db"),
        )
        .unwrap();
        live.reload(moved).await.unwrap();

        let config = live.read().await;
        assert_eq!(config.qr.session_ttl_secs, 1200);
        assert_eq!(config.qr.max_ttl_secs, 3600);
        assert_eq!(config.server.client_addr(), "127.0.0.1:4337");
        assert_eq!(config.database.path, "replay.db");
    }
}
