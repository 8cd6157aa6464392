use crate::backup::job::ProcessSpec;
use crate::backup::redacted::RedactedString;
use crate::backup::validate::validate_database_names;
use bon::Builder;
use derive_more::Display;
use getset::Getters;
use serde::{Deserialize, Serialize};
use validator::Validate;

fn default_host() -> String {
    "localhost".to_string()
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseEngine {
    #[display("postgres")]
    #[serde(alias = "postgresql", alias = "pg")]
    Postgres,
    #[display("mysql")]
    #[serde(alias = "mariadb")]
    Mysql,
}

/// One database server; every entry of `databases` is dumped separately.
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct DatabaseTarget {
    engine: DatabaseEngine,
    #[serde(default = "default_host")]
    #[validate(length(min = 1))]
    #[builder(default = default_host(), into)]
    host: String,
    port: Option<u16>,
    #[validate(length(min = 1))]
    #[builder(into)]
    user: String,
    #[validate(nested)]
    password: Option<RedactedString>,
    #[validate(length(min = 1), custom(function = validate_database_names))]
    #[builder(into)]
    databases: Vec<String>,
}

impl DatabaseTarget {
    /// Client dump command writing `database` as SQL to stdout.
    pub fn dump_command(&self, database: &str) -> ProcessSpec {
        let spec = match self.engine {
            DatabaseEngine::Postgres => {
                let spec = ProcessSpec::new("pg_dump").with_args(["-h", self.host.as_str()]);
                let spec = match self.port {
                    Some(port) => spec.arg("-p").arg(port.to_string()),
                    None => spec,
                };
                spec.with_args(["-U", self.user.as_str(), database])
            }
            DatabaseEngine::Mysql => {
                let spec = ProcessSpec::new("mysqldump").with_args(["-h", self.host.as_str()]);
                let spec = match self.port {
                    Some(port) => spec.arg("-P").arg(port.to_string()),
                    None => spec,
                };
                spec.with_args(["-u", self.user.as_str(), database])
            }
        };

        match &self.password {
            Some(password) => spec.secret_env(self.password_env(), password.clone()),
            None => spec,
        }
    }

    /// File stem of the dump of `database`, unique per server.
    pub fn dump_name(&self, database: &str) -> String {
        let host = sanitize_filename::sanitize(&self.host);
        match self.port {
            Some(port) => format!("{}-{}-{}-{}", self.engine, host, port, database),
            None => format!("{}-{}-{}", self.engine, host, database),
        }
    }

    fn password_env(&self) -> &'static str {
        match self.engine {
            DatabaseEngine::Postgres => "PGPASSWORD",
            DatabaseEngine::Mysql => "MYSQL_PWD",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    #[test]
    fn test_postgres_dump_command() {
        let target = DatabaseTarget::builder()
            .engine(DatabaseEngine::Postgres)
            .user("backup")
            .password(RedactedString::builder().inner("s3cret").build())
            .databases(vec!["app".to_string()])
            .build();

        let spec = target.dump_command("app");
        assert_eq!(spec.program(), "pg_dump");
        assert_eq!(
            spec.args(),
            &["-h", "localhost", "-U", "backup", "app"].map(OsString::from)
        );
        assert_eq!(spec.env()[0].0, "PGPASSWORD");
        assert!(!spec.to_string().contains("s3cret"));
    }

    #[test]
    fn test_mysql_dump_command_with_port() {
        let target = DatabaseTarget::builder()
            .engine(DatabaseEngine::Mysql)
            .host("db.internal")
            .port(3307)
            .user("root")
            .databases(vec!["shop".to_string()])
            .build();

        let spec = target.dump_command("shop");
        assert_eq!(spec.program(), "mysqldump");
        assert_eq!(
            spec.args(),
            &["-h", "db.internal", "-P", "3307", "-u", "root", "shop"].map(OsString::from)
        );
        assert!(spec.env().is_empty());
    }

    #[test]
    fn test_database_target_validation() {
        let yaml = r#"
engine: postgresql
user: backup
databases: [app, "../etc"]
"#;
        let target: DatabaseTarget = serde_yml::from_str(yaml).unwrap();
        assert_eq!(target.engine(), &DatabaseEngine::Postgres);
        assert!(target.validate().is_err());

        let empty = DatabaseTarget::builder()
            .engine(DatabaseEngine::Mysql)
            .user("root")
            .databases(Vec::<String>::new())
            .build();
        assert!(empty.validate().is_err());

        let option_like = DatabaseTarget::builder()
            .engine(DatabaseEngine::Postgres)
            .user("backup")
            .databases(vec!["--help".to_string()])
            .build();
        assert!(option_like.validate().is_err());
    }

    #[test]
    fn test_dump_name_tells_servers_apart() {
        let pg = DatabaseTarget::builder()
            .engine(DatabaseEngine::Postgres)
            .user("backup")
            .databases(vec!["app".to_string()])
            .build();
        let my = DatabaseTarget::builder()
            .engine(DatabaseEngine::Mysql)
            .user("root")
            .databases(vec!["app".to_string()])
            .build();
        let my_replica = DatabaseTarget::builder()
            .engine(DatabaseEngine::Mysql)
            .host("db.internal")
            .port(3307)
            .user("root")
            .databases(vec!["app".to_string()])
            .build();

        assert_eq!(pg.dump_name("app"), "postgres-localhost-app");
        assert_eq!(my.dump_name("app"), "mysql-localhost-app");
        assert_eq!(my_replica.dump_name("app"), "mysql-db.internal-3307-app");
    }
}
