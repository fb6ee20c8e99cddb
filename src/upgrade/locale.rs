// ABOUTME: Locale and encoding of the running cluster.
// ABOUTME: Reused for initdb so collation-dependent indexes stay valid after pg_upgrade.

use super::context::UpgradeContext;
use crate::process::{CommandSpec, ExecutionError, ProcessRunner};

const LOCALE_QUERY: &str = "SELECT datcollate, datctype, pg_encoding_to_char(encoding) \
                            FROM pg_database WHERE datname = 'template1'";

/// Collation, character classification and encoding of a cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterLocale {
    pub collate: String,
    pub ctype: String,
    pub encoding: String,
}

impl ClusterLocale {
    /// Parse `psql -A -t -F '|'` output of [`LOCALE_QUERY`].
    pub fn parse(stdout: &str) -> Option<Self> {
        let line = stdout.lines().map(str::trim).find(|l| !l.is_empty())?;
        let mut fields = line.split('|').map(str::trim);
        let collate = fields.next().filter(|s| !s.is_empty())?;
        let ctype = fields.next().filter(|s| !s.is_empty())?;
        let encoding = fields.next().filter(|s| !s.is_empty())?;

        Some(Self {
            collate: collate.to_string(),
            ctype: ctype.to_string(),
            encoding: encoding.to_string(),
        })
    }

    /// initdb flags that reproduce this locale.
    pub fn initdb_args(&self) -> Vec<String> {
        vec![
            format!("--encoding={}", self.encoding),
            format!("--lc-collate={}", self.collate),
            format!("--lc-ctype={}", self.ctype),
        ]
    }
}

/// Query the running cluster with the running version's `psql`.
pub async fn capture(
    ctx: &UpgradeContext,
    runner: &dyn ProcessRunner,
) -> Result<ClusterLocale, ExecutionError> {
    let psql = ctx
        .paths
        .version_bin_dir(ctx.running_version.major)
        .join("psql");

    let spec = CommandSpec::new(psql)
        .arg("-h")
        .arg(ctx.database.host.display().to_string())
        .arg("-p")
        .arg(ctx.database.port.to_string())
        .args(["-d", "template1", "-A", "-t", "-F", "|", "-c", LOCALE_QUERY])
        .run_as(&ctx.database.user);

    let output = runner.run_checked("capture cluster locale", &spec).await?;

    let locale = ClusterLocale::parse(&output.stdout).ok_or_else(|| {
        ExecutionError::failed(
            "capture cluster locale",
            format!("unexpected psql output: {:?}", output.stdout),
        )
    })?;

    tracing::info!(
        collate = %locale.collate,
        ctype = %locale.ctype,
        encoding = %locale.encoding,
        "captured cluster locale"
    );
    Ok(locale)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_psql_row() {
        let locale = ClusterLocale::parse("en_US.UTF-8|en_US.UTF-8|UTF8\n").unwrap();
        assert_eq!(locale.collate, "en_US.UTF-8");
        assert_eq!(locale.encoding, "UTF8");
        assert_eq!(
            locale.initdb_args(),
            vec![
                "--encoding=UTF8".to_string(),
                "--lc-collate=en_US.UTF-8".to_string(),
                "--lc-ctype=en_US.UTF-8".to_string(),
            ]
        );
    }

    #[test]
    fn rejects_incomplete_rows() {
        assert!(ClusterLocale::parse("C|C\n").is_none());
        assert!(ClusterLocale::parse("\n").is_none());
        assert!(ClusterLocale::parse("C||UTF8").is_none());
    }
}
