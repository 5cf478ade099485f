use std::fmt;
use std::io;
use std::process::Command;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SqlError {
    #[error("failed launching {command}: {source}")]
    Launch {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("{command} failed: {message}")]
    Failed { command: String, message: String },
    #[error("{command} produced non-UTF-8 output")]
    BadOutput { command: String },
}

/// Executes SQL against the target database. The ledger and the patch
/// executor only ever talk to this trait; how the statements reach the
/// server is the caller's business.
pub trait SqlDriver {
    /// Runs statements for their effect.
    fn execute(&self, sql: &str) -> Result<(), SqlError>;

    /// Runs statements inside a `START TRANSACTION`/`COMMIT` bracket. The
    /// bracket travels in the same invocation as the statements; a batch
    /// that aborts midway takes its connection down with the transaction
    /// still open, and the server rolls it back.
    fn execute_transactional(&self, sql: &str) -> Result<(), SqlError> {
        self.execute(&format!("START TRANSACTION;\n{sql}\nCOMMIT;"))
    }

    /// Runs a single query. Rows come back as columns in select order, with
    /// SQL NULL as `None`.
    fn query(&self, sql: &str) -> Result<Vec<Vec<Option<String>>>, SqlError>;
}

#[derive(Debug, Clone)]
pub struct MysqlParams {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub database: String,
    pub charset: String,
}

/// Drives a local `mysql` client process, one invocation per call.
pub struct MysqlShellDriver {
    params: MysqlParams,
}

impl MysqlShellDriver {
    pub fn new(params: MysqlParams) -> Self {
        Self { params }
    }

    pub(crate) fn command(&self, sql: &str, skip_column_names: bool) -> Command {
        let mut command = Command::new("mysql");
        command
            .arg("-h")
            .arg(&self.params.host)
            .arg("-P")
            .arg(self.params.port.to_string())
            .arg("-u")
            .arg(&self.params.user);
        if let Some(password) = &self.params.password {
            command.arg(format!("-p{password}"));
        }
        command
            .arg(format!("--default-character-set={}", self.params.charset))
            .arg("-e")
            .arg(sql);
        if skip_column_names {
            command.arg("--skip-column-names");
        }
        command.arg(&self.params.database);
        command
    }

    fn run(&self, sql: &str, skip_column_names: bool) -> Result<String, SqlError> {
        let output = self
            .command(sql, skip_column_names)
            .output()
            .map_err(|source| SqlError::Launch {
                command: "mysql".to_string(),
                source,
            })?;
        if !output.status.success() {
            return Err(SqlError::Failed {
                command: "mysql".to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        String::from_utf8(output.stdout).map_err(|_| SqlError::BadOutput {
            command: "mysql".to_string(),
        })
    }
}

impl SqlDriver for MysqlShellDriver {
    fn execute(&self, sql: &str) -> Result<(), SqlError> {
        self.run(sql, false).map(|_| ())
    }

    fn query(&self, sql: &str) -> Result<Vec<Vec<Option<String>>>, SqlError> {
        let stdout = self.run(sql, true)?;
        Ok(parse_batch_output(&stdout))
    }
}

impl fmt::Debug for MysqlShellDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MysqlShellDriver")
            .field("host", &self.params.host)
            .field("port", &self.params.port)
            .field("user", &self.params.user)
            .field("password", &self.params.password.as_deref().map(|_| "*****"))
            .field("database", &self.params.database)
            .field("charset", &self.params.charset)
            .finish()
    }
}

/// Parses `mysql --skip-column-names` batch output: one row per line,
/// tab-separated columns, the literal word NULL for SQL NULL.
pub fn parse_batch_output(stdout: &str) -> Vec<Vec<Option<String>>> {
    stdout
        .lines()
        .map(|line| {
            line.split('\t')
                .map(|field| {
                    if field == "NULL" {
                        None
                    } else {
                        Some(unescape_field(field))
                    }
                })
                .collect()
        })
        .collect()
}

/// Batch mode escapes tab, newline, NUL and backslash inside fields so the
/// row framing stays intact. Stored down actions span lines, so this matters.
pub(crate) fn unescape_field(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Renders a string as a quoted SQL literal.
pub(crate) fn sql_quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        match ch {
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}
