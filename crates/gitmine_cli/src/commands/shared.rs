use std::path::{Path, PathBuf};
use std::sync::Arc;

use console::style;
use gitmine::{
    HarvestOptions, PaginatedHarvester, RateLimitGovernor, RecordError, ReqwestTransport,
    RequestPacer,
};

use crate::HarvestArgs;
use crate::config::Config;
use crate::shutdown::shutdown_flag;

/// Build a harvester from config, with CLI flags taking precedence.
///
/// The harvester shares the global shutdown flag, so Ctrl+C stops it
/// before its next request.
pub(crate) fn build_harvester(
    config: &Config,
    args: &HarvestArgs,
) -> Result<PaginatedHarvester, Box<dyn std::error::Error>> {
    let transport = ReqwestTransport::with_timeout(config.harvest.timeout())?;
    let options = harvest_options(config, args);

    if options.token.is_none() {
        tracing::warn!("No GitHub token configured; unauthenticated requests are heavily rate limited");
    }

    let rps = args.requests_per_second.or(config.harvest.requests_per_second);

    Ok(PaginatedHarvester::new(Arc::new(transport), options)
        .with_governor(RateLimitGovernor::default().with_safety_margin(config.harvest.safety_margin()))
        .with_pacer(rps.map(RequestPacer::new))
        .with_cancel_flag(shutdown_flag()))
}

fn harvest_options(config: &Config, args: &HarvestArgs) -> HarvestOptions {
    HarvestOptions::default()
        .with_max_pages(args.max_pages.or(config.harvest.max_pages))
        .with_user_agent(config.harvest.user_agent.clone())
        .with_token(args.token.clone().or_else(|| config.github_token()))
}

/// Split an output file path into the directory and file name a
/// `DocumentStore` writes to.
pub(crate) fn split_output(path: &Path) -> Result<(PathBuf, String), Box<dyn std::error::Error>> {
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| format!("output path {} has no file name", path.display()))?
        .to_string();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, filename))
}

/// Report records a filter skipped.
pub(crate) fn display_skipped(skipped: &[RecordError], is_tty: bool) {
    if skipped.is_empty() {
        return;
    }

    if is_tty {
        eprintln!(
            "{} Skipped {} malformed record(s):",
            style("⚠").yellow(),
            skipped.len()
        );
        let display_count = skipped.len().min(10);
        for error in &skipped[..display_count] {
            eprintln!("  - {}", error);
        }
        if skipped.len() > display_count {
            eprintln!("  ... and {} more", skipped.len() - display_count);
        }
    } else {
        tracing::warn!(skipped = skipped.len(), "Skipped malformed records");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_output_with_directory() {
        let (dir, filename) = split_output(Path::new("data/out/repos.json")).unwrap();
        assert_eq!(dir, PathBuf::from("data/out"));
        assert_eq!(filename, "repos.json");
    }

    #[test]
    fn test_split_output_bare_filename_uses_cwd() {
        let (dir, filename) = split_output(Path::new("repos.json")).unwrap();
        assert_eq!(dir, PathBuf::from("."));
        assert_eq!(filename, "repos.json");
    }

    #[test]
    fn test_split_output_rejects_directory_path() {
        assert!(split_output(Path::new("/")).is_err());
        assert!(split_output(Path::new("data/..")).is_err());
    }

    #[test]
    fn test_cli_flags_override_config() {
        let mut config = Config::default();
        config.harvest.max_pages = Some(10);
        config.github.token = Some("from-config".to_string());

        let args = HarvestArgs {
            max_pages: Some(2),
            requests_per_second: None,
            token: Some("from-flag".to_string()),
        };
        let options = harvest_options(&config, &args);
        assert_eq!(options.max_pages, Some(2));
        assert_eq!(options.token.as_deref(), Some("from-flag"));

        let options = harvest_options(&config, &HarvestArgs::default());
        assert_eq!(options.max_pages, Some(10));
        assert_eq!(options.token.as_deref(), Some("from-config"));
    }
}
