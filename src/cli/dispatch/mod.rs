//! Map parsed CLI arguments to an action.

use crate::cli::{
    actions::{server::Args, Action},
    commands::{relying_party, ARG_PORT},
};
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(3000);
    let rp = relying_party::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        rp_name: rp.name,
        allowed_origins: rp.allowed_origins,
        ceremony_timeout: rp.ceremony_timeout,
        static_dir: rp.static_dir,
        policy: rp.policy,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;
    use crate::webauthn::UserVerification;
    use std::{path::PathBuf, time::Duration};

    #[test]
    fn builds_server_action() -> Result<()> {
        let matches = commands::new().try_get_matches_from(vec![
            "keyhold",
            "--port",
            "8080",
            "--rp-name",
            "Example",
            "--allowed-origins",
            "https://example.com, http://localhost:8080",
            "--ceremony-timeout-ms",
            "5000",
            "--static-dir",
            "public",
            "--user-verification",
            "preferred",
        ])?;

        let Action::Server(args) = handler(&matches)?;
        assert_eq!(args.port, 8080);
        assert_eq!(args.rp_name, "Example");
        assert_eq!(
            args.allowed_origins,
            vec![
                "https://example.com".to_string(),
                "http://localhost:8080".to_string()
            ]
        );
        assert_eq!(args.ceremony_timeout, Duration::from_secs(5));
        assert_eq!(args.static_dir, Some(PathBuf::from("public")));
        assert_eq!(args.policy.user_verification, UserVerification::Preferred);
        assert_eq!(args.policy.timeout, Duration::from_secs(5));
        Ok(())
    }

    #[test]
    fn blank_rp_name_is_rejected() -> Result<()> {
        let matches =
            commands::new().try_get_matches_from(vec!["keyhold", "--rp-name", "  "])?;
        assert!(handler(&matches).is_err());
        Ok(())
    }
}
