use tracing::info;

use crate::cmd::{Shell, sudo_args};
use crate::error::DeployResult;
use crate::pipeline::{Step, StepContext};

/// Role settings Django expects on every connection.
pub const ROLE_SETTINGS: &[(&str, &str)] = &[
    ("client_encoding", "utf8"),
    ("default_transaction_isolation", "read committed"),
    ("timezone", "UTC"),
];

/// Create the application role and database when absent.
pub struct CreateDatabase;

/// Reset the role password, settings and grants on every run.
pub struct ConfigureDatabaseRole;

impl Step for CreateDatabase {
    fn name(&self) -> &'static str {
        "database"
    }

    fn is_applied(&self, ctx: &StepContext<'_>) -> DeployResult<bool> {
        let c = ctx.config;
        Ok(role_exists(ctx.shell, &c.db_user)? && database_exists(ctx.shell, &c.db_name)?)
    }

    fn apply(&self, ctx: &StepContext<'_>) -> DeployResult<()> {
        let c = ctx.config;
        let shell = ctx.shell;

        if !role_exists(shell, &c.db_user)? {
            info!("creating role {}", c.db_user);
            tolerate_existing(psql(shell, &format!("CREATE ROLE {} LOGIN", quote_ident(&c.db_user))))?;
        }
        if !database_exists(shell, &c.db_name)? {
            info!("creating database {}", c.db_name);
            tolerate_existing(psql(
                shell,
                &format!(
                    "CREATE DATABASE {} OWNER {} ENCODING 'UTF8'",
                    quote_ident(&c.db_name),
                    quote_ident(&c.db_user)
                ),
            ))?;
        }
        Ok(())
    }
}

impl Step for ConfigureDatabaseRole {
    fn name(&self) -> &'static str {
        "database-role"
    }

    fn apply(&self, ctx: &StepContext<'_>) -> DeployResult<()> {
        let c = ctx.config;
        let script = role_script(&c.db_user, &c.db_password, &c.db_name);
        let args = sudo_args("postgres", "psql", &["-v", "ON_ERROR_STOP=1", "-q"]);
        // Piped so the password never shows up in the process list.
        ctx.shell.run_with_stdin("sudo", &args, script.as_bytes())?;
        info!("role {} configured", c.db_user);
        Ok(())
    }
}

/// SQL applied by [`ConfigureDatabaseRole`]. Deterministic for a
/// given configuration, so repeated runs converge.
#[must_use]
pub fn role_script(user: &str, password: &str, database: &str) -> String {
    let role = quote_ident(user);
    let db = quote_ident(database);
    let mut sql = format!(
        "ALTER ROLE {role} WITH LOGIN PASSWORD {};\n",
        quote_literal(password)
    );
    for (setting, value) in ROLE_SETTINGS {
        sql.push_str(&format!(
            "ALTER ROLE {role} SET {setting} TO {};\n",
            quote_literal(value)
        ));
    }
    sql.push_str(&format!("GRANT ALL PRIVILEGES ON DATABASE {db} TO {role};\n"));
    sql.push_str(&format!("ALTER DATABASE {db} OWNER TO {role};\n"));
    sql
}

fn psql(shell: &dyn Shell, sql: &str) -> DeployResult<String> {
    shell.run_as("postgres", "psql", &["-tAc", sql])
}

fn tolerate_existing(result: DeployResult<String>) -> DeployResult<()> {
    match result {
        Ok(_) => Ok(()),
        Err(e) if e.is_already_exists() => {
            info!("{e}: already exists, continuing");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

pub fn role_exists(shell: &dyn Shell, role: &str) -> DeployResult<bool> {
    let sql = format!("SELECT 1 FROM pg_roles WHERE rolname = {}", quote_literal(role));
    Ok(psql(shell, &sql)?.trim() == "1")
}

pub fn database_exists(shell: &dyn Shell, database: &str) -> DeployResult<bool> {
    let sql = format!(
        "SELECT 1 FROM pg_database WHERE datname = {}",
        quote_literal(database)
    );
    Ok(psql(shell, &sql)?.trim() == "1")
}

/// Drop the database, then the role. Used by uninstall.
pub fn drop_database(shell: &dyn Shell, database: &str, role: &str) -> DeployResult<()> {
    psql(shell, &format!("DROP DATABASE IF EXISTS {}", quote_ident(database)))?;
    psql(shell, &format!("DROP ROLE IF EXISTS {}", quote_ident(role)))?;
    Ok(())
}

#[must_use]
pub fn quote_ident(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

#[must_use]
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
