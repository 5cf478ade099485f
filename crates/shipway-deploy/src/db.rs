use shipway_ledger::{parse_batch_output, MysqlParams, SqlDriver, SqlError};

use crate::command::RemoteCommand;
use crate::shell::{RemoteShell, ShellError};

/// Runs SQL through a `mysql` client on the control host. The check flows
/// inspect the ledger over this driver before any file is uploaded; the
/// actual migrations run on the release itself through `patch-run`.
pub struct RemoteSqlDriver<'a> {
    shell: &'a dyn RemoteShell,
    control_host: String,
    params: MysqlParams,
}

impl<'a> RemoteSqlDriver<'a> {
    pub fn new(shell: &'a dyn RemoteShell, control_host: &str, params: MysqlParams) -> Self {
        Self {
            shell,
            control_host: control_host.to_string(),
            params,
        }
    }

    fn command(&self, sql: &str, skip_column_names: bool) -> RemoteCommand {
        let mut command = RemoteCommand::program("mysql")
            .flag("-h")
            .arg(&self.params.host)
            .flag("-P")
            .arg(&self.params.port.to_string())
            .flag("-u")
            .arg(&self.params.user);
        if let Some(password) = &self.params.password {
            command = command.fused_secret("-p", password);
        }
        command = command
            .arg(&format!("--default-character-set={}", self.params.charset))
            .flag("-e")
            .arg(sql);
        if skip_column_names {
            command = command.flag("--skip-column-names");
        }
        command.arg(&self.params.database)
    }

    fn run(&self, sql: &str, skip_column_names: bool) -> Result<String, SqlError> {
        let command = self.command(sql, skip_column_names);
        self.shell
            .run(&self.control_host, &command)
            .map_err(|error| match error {
                ShellError::Launch { source, .. } => SqlError::Launch {
                    command: "ssh".to_string(),
                    source,
                },
                ShellError::Failed { message, .. } => SqlError::Failed {
                    command: "mysql".to_string(),
                    message,
                },
                ShellError::BadOutput { .. } => SqlError::BadOutput {
                    command: "mysql".to_string(),
                },
            })
    }
}

impl SqlDriver for RemoteSqlDriver<'_> {
    fn execute(&self, sql: &str) -> Result<(), SqlError> {
        self.run(sql, false).map(|_| ())
    }

    fn query(&self, sql: &str) -> Result<Vec<Vec<Option<String>>>, SqlError> {
        let stdout = self.run(sql, true)?;
        Ok(parse_batch_output(&stdout))
    }
}
