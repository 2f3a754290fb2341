//! Build connectors from `highwater.toml` entries

use anyhow::{anyhow, Context, Result};
use highwater_catalog::{
    LocalCatalog, LocalWarehouse, PostgresAdapter, SnowflakeAdapter, SnowflakeAdapterBuilder,
    SourceCatalog, WarehouseAdapter,
};
use highwater_core::{Config, ConnectionConfig};

/// Open the source catalog described by `[source]`
pub fn build_source(config: &Config) -> Result<Box<dyn SourceCatalog>> {
    let source = &config.source;

    match source.connection_type.to_lowercase().as_str() {
        "local" => {
            let root = config.resolve_path(source.require("root")?);
            let catalog = LocalCatalog::open(&root)
                .with_context(|| format!("Failed to open source catalog at {}", root.display()))?;
            Ok(Box::new(catalog))
        }
        other => Err(anyhow!(
            "Unsupported source type '{}'. Supported: local",
            other
        )),
    }
}

/// Connect to the warehouse registered as `[connections.<name>]`
pub async fn build_warehouse(config: &Config, name: &str) -> Result<Box<dyn WarehouseAdapter>> {
    let connection = config.connection(name)?;
    let batch_size = config.load.batch_size;

    let adapter: Box<dyn WarehouseAdapter> = match connection.connection_type.to_lowercase().as_str() {
        "local" => {
            let root = config.resolve_path(connection.require("root")?);
            Box::new(LocalWarehouse::new(root))
        }
        "snowflake" => {
            let adapter = snowflake_builder(connection)?
                .with_batch_size(batch_size)
                .build()?;
            Box::new(adapter)
        }
        "postgres" | "postgresql" | "redshift" => {
            let mut adapter = connect_postgres(connection).await?.with_batch_size(batch_size);
            if let Some(schema) = connection.setting("schema")? {
                adapter = adapter.with_schema(schema);
            }
            Box::new(adapter)
        }
        other => {
            return Err(anyhow!(
                "Unsupported connection type '{}' for '{}'. Supported: local, snowflake, postgres",
                other,
                name
            ));
        }
    };

    tracing::debug!(connection = name, adapter = adapter.name(), "warehouse adapter ready");
    Ok(adapter)
}

fn snowflake_builder(connection: &ConnectionConfig) -> Result<SnowflakeAdapterBuilder> {
    let account = connection.require("account")?;
    let username = connection.require("username")?;

    let mut builder = match (connection.setting("password")?, connection.setting("private_key")?) {
        (_, Some(private_key_pem)) => SnowflakeAdapterBuilder::with_key_pair(account, username, private_key_pem),
        (Some(password), None) => SnowflakeAdapter::new(account, username, password),
        (None, None) => {
            return Err(anyhow!(
                "snowflake connection requires 'password' or 'private_key'"
            ))
        }
    };

    if let Some(warehouse) = connection.setting("warehouse")? {
        builder = builder.with_warehouse(warehouse);
    }
    if let Some(role) = connection.setting("role")? {
        builder = builder.with_role(role);
    }
    if let Some(database) = connection.setting("database")? {
        builder = builder.with_database(database);
    }
    if let Some(schema) = connection.setting("schema")? {
        builder = builder.with_schema(schema);
    }

    Ok(builder)
}

async fn connect_postgres(connection: &ConnectionConfig) -> Result<PostgresAdapter> {
    let tls = matches!(connection.setting("tls")?.as_deref(), Some("true"));

    if let Some(conn_str) = connection.setting("connection_string")? {
        let adapter = if tls {
            PostgresAdapter::from_connection_string_with_tls(&conn_str).await?
        } else {
            PostgresAdapter::from_connection_string(&conn_str).await?
        };
        return Ok(adapter);
    }

    let host = connection.require("host")?;
    let port = match connection.setting("port")? {
        Some(port) => port
            .parse::<u16>()
            .with_context(|| format!("Invalid postgres port '{}'", port))?,
        None => 5432,
    };
    let database = connection.require("database")?;
    let user = connection.require("user")?;
    let password = connection.setting("password")?.unwrap_or_default();

    let adapter = if tls {
        PostgresAdapter::connect_with_tls(host, port, database, user, password).await?
    } else {
        PostgresAdapter::connect(host, port, database, user, password).await?
    };
    Ok(adapter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_source_type() {
        let mut config = Config::default();
        config.source = ConnectionConfig::new("hive");
        let err = build_source(&config).err().unwrap();
        assert!(err.to_string().contains("Unsupported source type 'hive'"));
    }

    #[tokio::test]
    async fn unknown_connection_name() {
        let config = Config::default();
        let err = build_warehouse(&config, "nope").await.err().unwrap();
        assert!(err.to_string().contains("No connection named 'nope'"));
    }

    #[tokio::test]
    async fn local_warehouse_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.project_root = dir.path().to_path_buf();
        config
            .connections
            .insert("dev".to_string(), ConnectionConfig::new("local").with_setting("root", "warehouse"));

        let adapter = build_warehouse(&config, "dev").await.unwrap();
        assert_eq!(adapter.name(), "Local");
        adapter.test_connection().await.unwrap();
    }

    #[test]
    fn snowflake_needs_credentials() {
        let connection = ConnectionConfig::new("snowflake")
            .with_setting("account", "xy12345")
            .with_setting("username", "loader");
        assert!(snowflake_builder(&connection).is_err());

        let connection = connection.with_setting("password", "secret");
        assert!(snowflake_builder(&connection).is_ok());
    }

    #[test]
    fn missing_setting_names_the_key() {
        let connection = ConnectionConfig::new("snowflake").with_setting("username", "loader");
        let err = snowflake_builder(&connection).err().unwrap();
        assert_eq!(err.to_string(), "snowflake connection requires 'account'");
    }
}
