use std::path::PathBuf;

use clap::Parser;
use gsa_clock::{Clock, System};
use gsa_tokens::{
    cache::{store::FileStore, CacheKeys, EncryptedTokenCache},
    transport::ReqwestTransport,
    Scopes, ServiceAccountConfig, TokenManager,
};

#[derive(Debug, Parser)]
struct Opts {
    /// The service account key file
    #[arg(
        short = 'k',
        long,
        env = "GOOGLE_APPLICATION_CREDENTIALS",
        required_unless_present = "generate_keys"
    )]
    credentials: Option<PathBuf>,

    /// Overrides the token endpoint named in the key file
    #[arg(short, long, env)]
    token_uri: Option<String>,

    /// The local file used to cache the encrypted token
    #[arg(short = 'f', long, env, default_value = ".token.cache")]
    cache_file: PathBuf,

    /// Base64 encryption key for the token cache
    #[arg(long, env = "TOKEN_CACHE_ENC_KEY", hide_env_values = true, requires = "mac_key")]
    enc_key: Option<String>,

    /// Base64 MAC key for the token cache
    #[arg(long, env = "TOKEN_CACHE_MAC_KEY", hide_env_values = true, requires = "enc_key")]
    mac_key: Option<String>,

    /// Prints a fresh pair of cache keys and exits
    #[arg(long)]
    generate_keys: bool,

    /// Prints the full access token instead of a redacted prefix
    #[arg(long)]
    reveal: bool,

    /// The scopes to request
    #[arg(
        short,
        long = "scope",
        env = "SCOPES",
        value_delimiter = ' ',
        default_value = "https://www.googleapis.com/auth/cloud-platform"
    )]
    scopes: Vec<String>,
}

fn main() -> color_eyre::Result<()> {
    dotenvy::dotenv().ok();
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .pretty()
        .with_env_filter(tracing_subscriber::filter::EnvFilter::from_default_env())
        .init();

    let opts = Opts::parse();

    if opts.generate_keys {
        let (enc, mac) = CacheKeys::generate()?.to_base64();
        println!("TOKEN_CACHE_ENC_KEY={}", enc);
        println!("TOKEN_CACHE_MAC_KEY={}", mac);
        return Ok(());
    }

    let credentials = opts
        .credentials
        .ok_or_else(|| color_eyre::eyre::eyre!("a service account key file is required"))?;
    let mut config = ServiceAccountConfig::from_file(credentials)?;
    if let Some(token_uri) = opts.token_uri {
        config = config.with_token_uri(token_uri);
    }

    let keys = match (opts.enc_key, opts.mac_key) {
        (Some(enc), Some(mac)) => CacheKeys::from_base64(&enc, &mac)?,
        _ => {
            tracing::warn!("no cache keys provided; using the insecure built-in keys");
            CacheKeys::insecure_default()
        }
    };

    let cache = EncryptedTokenCache::with_keys(FileStore::new(opts.cache_file), keys);
    let manager = TokenManager::new(config, ReqwestTransport::new()?).with_cache(cache);

    let scopes = Scopes::from(opts.scopes);
    let token = manager.fetch_access_token(scopes)?;
    let remaining = token.expires_in_at(System.now());

    if opts.reveal {
        println!("{:#}", token.access_token());
    } else {
        println!("{:#?}", token.access_token());
    }

    tracing::info!(
        token_type = token.token_type(),
        remaining = remaining.0,
        expires_at = token.expires_at().0,
        "access token ready"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_is_well_formed() {
        Opts::command().debug_assert();
    }

    #[test]
    fn generate_keys_needs_no_key_file() -> color_eyre::Result<()> {
        let opts = Opts::try_parse_from(["fetch_token", "--generate-keys"])?;
        assert!(opts.generate_keys);
        Ok(())
    }

    #[test]
    fn scopes_split_on_spaces() -> color_eyre::Result<()> {
        let opts = Opts::try_parse_from([
            "fetch_token",
            "-k",
            "service-account.json",
            "--scope",
            "scope-a scope-b",
        ])?;
        assert_eq!(opts.credentials, Some(PathBuf::from("service-account.json")));
        assert_eq!(opts.scopes, ["scope-a", "scope-b"]);
        Ok(())
    }
}
