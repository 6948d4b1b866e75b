//! [`PostgresBackend`] — the PostgreSQL dialect and connection pool.

use bytes::BytesMut;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use satchel_core::{
  Error, Result,
  dialect::{ColumnInfo, ColumnTypes, SqlBackend, SqlDialect},
  value::{Params, Row, SqlValue},
};
use tokio_postgres::{
  NoTls,
  types::{IsNull, ToSql, Type, to_sql_checked},
};
use tracing::debug;

use crate::config::PostgresConfig;

/// A satchel backend over a pooled PostgreSQL database.
///
/// Cloning shares the pool. Statements run on whichever connection the pool
/// hands out; the engine's compare-and-swap writes need no session state.
#[derive(Clone)]
pub struct PostgresBackend {
  pool: Pool,
}

impl PostgresBackend {
  /// Build the pool and check out one connection to fail fast on bad
  /// credentials or an unreachable server.
  pub async fn connect(config: &PostgresConfig) -> Result<Self> {
    let mut pg = tokio_postgres::Config::new();
    pg.host(&config.host)
      .port(config.port)
      .user(&config.user)
      .password(&config.password)
      .dbname(&config.dbname);

    let manager = Manager::from_config(pg, NoTls, ManagerConfig {
      recycling_method: RecyclingMethod::Fast,
    });
    let pool = Pool::builder(manager)
      .max_size(config.pool_size)
      .build()
      .map_err(Error::backend)?;
    pool.get().await.map_err(Error::backend)?;
    Ok(Self { pool })
  }

  pub async fn from_env() -> Result<Self> {
    Self::connect(&PostgresConfig::from_env()?).await
  }

  async fn client(&self) -> Result<deadpool_postgres::Object> {
    self.pool.get().await.map_err(Error::backend)
  }
}

/// Binds a [`SqlValue`] against whatever column type the server inferred
/// for the parameter, converting where the engine's neutral value is wider
/// or narrower than the column. NULL binds to any type.
#[derive(Debug)]
struct PgValue<'a>(&'a SqlValue);

impl ToSql for PgValue<'_> {
  fn to_sql(
    &self,
    ty: &Type,
    out: &mut BytesMut,
  ) -> std::result::Result<IsNull, Box<dyn std::error::Error + Sync + Send>>
  {
    match self.0 {
      SqlValue::Null => Ok(IsNull::Yes),
      SqlValue::Int(i) => {
        if *ty == Type::INT2 {
          (*i as i16).to_sql(ty, out)
        } else if *ty == Type::INT4 {
          (*i as i32).to_sql(ty, out)
        } else if *ty == Type::FLOAT4 {
          (*i as f32).to_sql(ty, out)
        } else if *ty == Type::FLOAT8 {
          (*i as f64).to_sql(ty, out)
        } else {
          i.to_sql(ty, out)
        }
      }
      SqlValue::Float(f) => {
        if *ty == Type::FLOAT4 {
          (*f as f32).to_sql(ty, out)
        } else {
          f.to_sql(ty, out)
        }
      }
      SqlValue::Text(s) => s.to_sql(ty, out),
      SqlValue::Bool(b) => {
        if *ty == Type::BOOL {
          b.to_sql(ty, out)
        } else {
          i64::from(*b).to_sql(ty, out)
        }
      }
    }
  }

  fn accepts(_ty: &Type) -> bool {
    true
  }

  to_sql_checked!();
}

fn bind(params: &Params) -> Vec<PgValue<'_>> {
  params.iter().map(|p| PgValue(&p.value)).collect()
}

fn decode_row(row: &tokio_postgres::Row) -> Result<Row> {
  let mut decoded = Row::new();
  for (i, column) in row.columns().iter().enumerate() {
    let ty = column.type_();
    let value = if *ty == Type::TEXT
      || *ty == Type::VARCHAR
      || *ty == Type::BPCHAR
    {
      row
        .try_get::<_, Option<String>>(i)
        .map_err(Error::backend)?
        .map_or(SqlValue::Null, SqlValue::Text)
    } else if *ty == Type::INT8 {
      row
        .try_get::<_, Option<i64>>(i)
        .map_err(Error::backend)?
        .map_or(SqlValue::Null, SqlValue::Int)
    } else if *ty == Type::INT4 {
      row
        .try_get::<_, Option<i32>>(i)
        .map_err(Error::backend)?
        .map_or(SqlValue::Null, |v| SqlValue::Int(i64::from(v)))
    } else if *ty == Type::INT2 {
      row
        .try_get::<_, Option<i16>>(i)
        .map_err(Error::backend)?
        .map_or(SqlValue::Null, |v| SqlValue::Int(i64::from(v)))
    } else if *ty == Type::FLOAT8 {
      row
        .try_get::<_, Option<f64>>(i)
        .map_err(Error::backend)?
        .map_or(SqlValue::Null, SqlValue::Float)
    } else if *ty == Type::FLOAT4 {
      row
        .try_get::<_, Option<f32>>(i)
        .map_err(Error::backend)?
        .map_or(SqlValue::Null, |v| SqlValue::Float(f64::from(v)))
    } else if *ty == Type::BOOL {
      row
        .try_get::<_, Option<bool>>(i)
        .map_err(Error::backend)?
        .map_or(SqlValue::Null, SqlValue::Bool)
    } else {
      SqlValue::Null
    };
    decoded.set(column.name(), value);
  }
  Ok(decoded)
}

impl SqlDialect for PostgresBackend {
  fn quote_ident(&self, name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
  }

  fn placeholder(&self, ordinal: usize, _name: &str) -> String {
    format!("${ordinal}")
  }

  fn pagination_clause(&self, limit: u64, offset: Option<u64>) -> String {
    match offset {
      Some(offset) => format!(" LIMIT {limit} OFFSET {offset}"),
      None => format!(" LIMIT {limit}"),
    }
  }

  fn column_types(&self) -> ColumnTypes {
    ColumnTypes {
      small_text:      "text",
      large_text:      "text",
      searchable_text: "text",
      int:             "BIGINT",
      float:           "double precision",
      auto_pk:         "BIGSERIAL PRIMARY KEY",
    }
  }
}

impl SqlBackend for PostgresBackend {
  async fn execute(&self, sql: &str, params: &Params) -> Result<u64> {
    debug!(sql, "execute");
    let client = self.client().await?;
    let values = bind(params);
    let refs: Vec<&(dyn ToSql + Sync)> =
      values.iter().map(|v| v as &(dyn ToSql + Sync)).collect();
    client.execute(sql, &refs).await.map_err(Error::backend)
  }

  async fn query_one(&self, sql: &str, params: &Params) -> Result<Option<Row>> {
    debug!(sql, "query_one");
    let client = self.client().await?;
    let values = bind(params);
    let refs: Vec<&(dyn ToSql + Sync)> =
      values.iter().map(|v| v as &(dyn ToSql + Sync)).collect();
    let row = client.query_opt(sql, &refs).await.map_err(Error::backend)?;
    row.as_ref().map(decode_row).transpose()
  }

  async fn query_all(&self, sql: &str, params: &Params) -> Result<Vec<Row>> {
    debug!(sql, "query_all");
    let client = self.client().await?;
    let values = bind(params);
    let refs: Vec<&(dyn ToSql + Sync)> =
      values.iter().map(|v| v as &(dyn ToSql + Sync)).collect();
    let rows = client.query(sql, &refs).await.map_err(Error::backend)?;
    rows.iter().map(decode_row).collect()
  }

  async fn table_exists(&self, name: &str) -> Result<bool> {
    let client = self.client().await?;
    let row = client
      .query_opt(
        "SELECT 1 FROM information_schema.tables
         WHERE table_schema = 'public' AND table_name = $1",
        &[&name],
      )
      .await
      .map_err(Error::backend)?;
    Ok(row.is_some())
  }

  async fn list_user_tables(&self) -> Result<Vec<String>> {
    let client = self.client().await?;
    let rows = client
      .query(
        "SELECT table_name FROM information_schema.tables
         WHERE table_schema = 'public' AND table_type = 'BASE TABLE'",
        &[],
      )
      .await
      .map_err(Error::backend)?;
    rows.iter().map(|r| r.try_get(0).map_err(Error::backend)).collect()
  }

  async fn list_columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
    let client = self.client().await?;
    let rows = client
      .query(
        "SELECT column_name, data_type FROM information_schema.columns
         WHERE table_schema = 'public' AND table_name = $1",
        &[&table],
      )
      .await
      .map_err(Error::backend)?;
    rows
      .iter()
      .map(|r| {
        Ok(ColumnInfo {
          name:      r.try_get(0).map_err(Error::backend)?,
          data_type: r.try_get(1).map_err(Error::backend)?,
        })
      })
      .collect()
  }

  async fn close(&self) -> Result<()> {
    self.pool.close();
    Ok(())
  }
}
