use crate::webauthn::{
    AttestationPreference, AuthenticatorAttachment, CeremonyPolicy, UserVerification,
    DEFAULT_CEREMONY_TIMEOUT_MS, DEFAULT_ORIGIN, DEFAULT_RP_NAME,
};
use clap::{builder::PossibleValuesParser, Arg, ArgMatches, Command};
use std::{path::PathBuf, time::Duration};

pub const ARG_RP_NAME: &str = "rp-name";
pub const ARG_ALLOWED_ORIGINS: &str = "allowed-origins";
pub const ARG_CEREMONY_TIMEOUT_MS: &str = "ceremony-timeout-ms";
pub const ARG_STATIC_DIR: &str = "static-dir";
pub const ARG_ATTESTATION: &str = "attestation";
pub const ARG_AUTHENTICATOR_ATTACHMENT: &str = "authenticator-attachment";
pub const ARG_USER_VERIFICATION: &str = "user-verification";

/// Attachment value that leaves the authenticator choice to the client.
const ANY_ATTACHMENT: &str = "any";

#[derive(Debug, Clone)]
pub struct Options {
    pub name: String,
    pub allowed_origins: Vec<String>,
    pub ceremony_timeout: Duration,
    pub static_dir: Option<PathBuf>,
    pub policy: CeremonyPolicy,
}

impl Options {
    /// Parse relying-party arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the name is blank, no origin is given or a policy
    /// value is unknown.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let name = match matches.get_one::<String>(ARG_RP_NAME).cloned() {
            Some(value) if !value.trim().is_empty() => value,
            _ => anyhow::bail!("missing required argument: --{ARG_RP_NAME}"),
        };

        let allowed_origins: Vec<String> = matches
            .get_many::<String>(ARG_ALLOWED_ORIGINS)
            .map(|values| {
                values
                    .map(|value| value.trim().to_string())
                    .filter(|value| !value.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        if allowed_origins.is_empty() {
            anyhow::bail!("missing required argument: --{ARG_ALLOWED_ORIGINS}");
        }

        let ceremony_timeout = Duration::from_millis(
            matches
                .get_one::<u64>(ARG_CEREMONY_TIMEOUT_MS)
                .copied()
                .unwrap_or(DEFAULT_CEREMONY_TIMEOUT_MS),
        );

        let static_dir = matches
            .get_one::<String>(ARG_STATIC_DIR)
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        let defaults = CeremonyPolicy::default();
        let attestation = match matches.get_one::<String>(ARG_ATTESTATION) {
            Some(value) => value.parse()?,
            None => defaults.attestation,
        };
        let attachment = match matches.get_one::<String>(ARG_AUTHENTICATOR_ATTACHMENT) {
            Some(value) if value == ANY_ATTACHMENT => None,
            Some(value) => Some(value.parse::<AuthenticatorAttachment>()?),
            None => defaults.attachment,
        };
        let user_verification = match matches.get_one::<String>(ARG_USER_VERIFICATION) {
            Some(value) => value.parse()?,
            None => defaults.user_verification,
        };

        Ok(Self {
            name,
            allowed_origins,
            ceremony_timeout,
            static_dir,
            policy: CeremonyPolicy {
                attestation,
                attachment,
                user_verification,
                timeout: ceremony_timeout,
            },
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let default_timeout: &'static str =
        Box::leak(DEFAULT_CEREMONY_TIMEOUT_MS.to_string().into_boxed_str());
    let defaults = CeremonyPolicy::default();

    command
        .arg(
            Arg::new(ARG_RP_NAME)
                .long(ARG_RP_NAME)
                .help("Relying party display name")
                .default_value(DEFAULT_RP_NAME)
                .env("KEYHOLD_RP_NAME"),
        )
        .arg(
            Arg::new(ARG_ALLOWED_ORIGINS)
                .long(ARG_ALLOWED_ORIGINS)
                .help("Comma separated origins allowed to run ceremonies")
                .long_help(
                    "Comma separated origins allowed to run ceremonies, example: https://app.example.com,http://localhost:3000\n\nThe relying party ID is the hostname of the origin a request comes from. Requests without Origin or Referer use the first entry.",
                )
                .default_value(DEFAULT_ORIGIN)
                .value_delimiter(',')
                .env("KEYHOLD_ALLOWED_ORIGINS"),
        )
        .arg(
            Arg::new(ARG_CEREMONY_TIMEOUT_MS)
                .long(ARG_CEREMONY_TIMEOUT_MS)
                .help("Ceremony timeout in milliseconds")
                .default_value(default_timeout)
                .env("KEYHOLD_CEREMONY_TIMEOUT_MS")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_ATTESTATION)
                .long(ARG_ATTESTATION)
                .help("Attestation conveyance preference")
                .default_value(defaults.attestation.as_str())
                .env("KEYHOLD_ATTESTATION")
                .value_parser(PossibleValuesParser::new([
                    AttestationPreference::None.as_str(),
                    AttestationPreference::Indirect.as_str(),
                    AttestationPreference::Direct.as_str(),
                ])),
        )
        .arg(
            Arg::new(ARG_AUTHENTICATOR_ATTACHMENT)
                .long(ARG_AUTHENTICATOR_ATTACHMENT)
                .help("Authenticator attachment requested at registration")
                .default_value(
                    defaults
                        .attachment
                        .map_or(ANY_ATTACHMENT, AuthenticatorAttachment::as_str),
                )
                .env("KEYHOLD_AUTHENTICATOR_ATTACHMENT")
                .value_parser(PossibleValuesParser::new([
                    AuthenticatorAttachment::Platform.as_str(),
                    AuthenticatorAttachment::CrossPlatform.as_str(),
                    ANY_ATTACHMENT,
                ])),
        )
        .arg(
            Arg::new(ARG_USER_VERIFICATION)
                .long(ARG_USER_VERIFICATION)
                .help("User verification requirement")
                .default_value(defaults.user_verification.as_str())
                .env("KEYHOLD_USER_VERIFICATION")
                .value_parser(PossibleValuesParser::new([
                    UserVerification::Required.as_str(),
                    UserVerification::Preferred.as_str(),
                    UserVerification::Discouraged.as_str(),
                ])),
        )
        .arg(
            Arg::new(ARG_STATIC_DIR)
                .long(ARG_STATIC_DIR)
                .help("Directory served for paths not matched by the API")
                .env("KEYHOLD_STATIC_DIR"),
        )
}
