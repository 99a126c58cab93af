use crate::{
    api,
    cli::telemetry,
    webauthn::{
        CeremonyPolicy, Ceremonies, CeremonyService, MemoryCredentialStore, PasskeyEngine,
        RelyingPartyConfig,
    },
};
use anyhow::{Context, Result};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub rp_name: String,
    pub allowed_origins: Vec<String>,
    pub ceremony_timeout: Duration,
    pub static_dir: Option<PathBuf>,
    pub policy: CeremonyPolicy,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the relying-party configuration is invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let relying_party = RelyingPartyConfig::new(
        args.rp_name.clone(),
        args.allowed_origins.clone(),
        args.ceremony_timeout,
    )
    .context("Invalid relying party configuration")?
    .with_policy(args.policy.clone());

    log_startup_args(&args, &relying_party);

    let ceremonies: Arc<dyn Ceremonies> = Arc::new(CeremonyService::new(
        Arc::new(MemoryCredentialStore::new()),
        PasskeyEngine::new(),
        relying_party.clone(),
    ));

    let result = api::new(
        args.port,
        ceremonies,
        relying_party.allowed_origins(),
        args.static_dir.as_deref(),
    )
    .await;

    telemetry::shutdown_tracer();

    result
}

fn log_startup_args(args: &Args, relying_party: &RelyingPartyConfig) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("rp_name", relying_party.name().to_string()),
        ("allowed_origins", relying_party.allowed_origins().join(", ")),
        (
            "ceremony_timeout_ms",
            relying_party.policy().timeout_ms().to_string(),
        ),
        ("attestation", relying_party.policy().attestation.as_str().to_string()),
        (
            "authenticator_attachment",
            relying_party
                .policy()
                .attachment
                .map_or_else(|| "any".to_string(), |a| a.as_str().to_string()),
        ),
        (
            "user_verification",
            relying_party.policy().user_verification.as_str().to_string(),
        ),
        (
            "static_dir",
            args.static_dir
                .as_ref()
                .map_or_else(|| "none".to_string(), |dir| dir.display().to_string()),
        ),
    ];
    log_entries("Startup configuration", &entries);
}

fn log_entries(title: &str, entries: &[(&str, String)]) {
    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!("{}\n\n{title}:", keyhold_banner());
    for (key, value) in entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn keyhold_banner() -> String {
    let short_hash = short_commit(crate::GIT_COMMIT_HASH);
    KEYHOLD_BANNER.replace(
        "{VERSION}",
        &format!(" - {} - {}", env!("CARGO_PKG_VERSION"), short_hash),
    )
}

fn short_commit(hash: &str) -> String {
    hash.trim().chars().take(7).collect()
}

const KEYHOLD_BANNER: &str = r"
   .--.
  /.-. '----------.
  \'-' .--'--''-'-'   K E Y H O L D {VERSION}
   '--'";
