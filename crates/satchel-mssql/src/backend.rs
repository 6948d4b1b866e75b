//! [`MssqlBackend`] — the SQL Server dialect and TDS connection.

use std::sync::Arc;

use satchel_core::{
  Error, Result,
  dialect::{ColumnInfo, ColumnTypes, SqlBackend, SqlDialect},
  value::{Params, Row, SqlValue},
};
use tiberius::{AuthMethod, Client, ColumnData, ToSql};
use tokio::{net::TcpStream, sync::Mutex};
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;

use crate::config::MssqlConfig;

type TdsClient = Client<Compat<TcpStream>>;

/// A satchel backend over one SQL Server connection.
///
/// Clones share the connection behind a mutex, so statements serialize; the
/// slot empties on [`SqlBackend::close`] and later calls fail cleanly.
#[derive(Clone)]
pub struct MssqlBackend {
  client: Arc<Mutex<Option<TdsClient>>>,
}

impl MssqlBackend {
  pub async fn connect(config: &MssqlConfig) -> Result<Self> {
    let mut tds = tiberius::Config::new();
    tds.host(&config.host);
    tds.port(config.port);
    tds.database(&config.dbname);
    tds.authentication(AuthMethod::sql_server(&config.user, &config.password));
    tds.trust_cert();

    let tcp =
      TcpStream::connect(tds.get_addr()).await.map_err(Error::backend)?;
    tcp.set_nodelay(true).map_err(Error::backend)?;
    let client = Client::connect(tds, tcp.compat_write())
      .await
      .map_err(Error::backend)?;
    Ok(Self { client: Arc::new(Mutex::new(Some(client))) })
  }

  pub async fn from_env() -> Result<Self> {
    Self::connect(&MssqlConfig::from_env()?).await
  }
}

fn not_connected() -> Error {
  Error::backend(std::io::Error::from(std::io::ErrorKind::NotConnected))
}

/// Binds a neutral value as a TDS parameter. NULL is typed as a string,
/// which the server coerces for any column the engine creates.
struct MsValue<'a>(&'a SqlValue);

impl ToSql for MsValue<'_> {
  fn to_sql(&self) -> ColumnData<'_> {
    match self.0 {
      SqlValue::Null => ColumnData::String(None),
      SqlValue::Int(i) => ColumnData::I64(Some(*i)),
      SqlValue::Float(f) => ColumnData::F64(Some(*f)),
      SqlValue::Text(s) => ColumnData::String(Some(s.as_str().into())),
      SqlValue::Bool(b) => ColumnData::Bit(Some(*b)),
    }
  }
}

fn decode(data: &ColumnData<'_>) -> SqlValue {
  match data {
    ColumnData::Bit(v) => v.map_or(SqlValue::Null, SqlValue::Bool),
    ColumnData::U8(v) => v.map_or(SqlValue::Null, |v| SqlValue::Int(i64::from(v))),
    ColumnData::I16(v) => v.map_or(SqlValue::Null, |v| SqlValue::Int(i64::from(v))),
    ColumnData::I32(v) => v.map_or(SqlValue::Null, |v| SqlValue::Int(i64::from(v))),
    ColumnData::I64(v) => v.map_or(SqlValue::Null, SqlValue::Int),
    ColumnData::F32(v) => {
      v.map_or(SqlValue::Null, |v| SqlValue::Float(f64::from(v)))
    }
    ColumnData::F64(v) => v.map_or(SqlValue::Null, SqlValue::Float),
    ColumnData::String(v) => {
      v.as_ref().map_or(SqlValue::Null, |v| SqlValue::Text(v.to_string()))
    }
    _ => SqlValue::Null,
  }
}

fn decode_rows(rows: Vec<tiberius::Row>) -> Vec<Row> {
  rows
    .into_iter()
    .map(|row| {
      let mut decoded = Row::new();
      for (column, data) in row.cells() {
        decoded.set(column.name(), decode(data));
      }
      decoded
    })
    .collect()
}

impl SqlDialect for MssqlBackend {
  fn quote_ident(&self, name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
  }

  fn placeholder(&self, ordinal: usize, _name: &str) -> String {
    format!("@P{ordinal}")
  }

  fn pagination_clause(&self, limit: u64, offset: Option<u64>) -> String {
    let offset = offset.unwrap_or(0);
    format!(" OFFSET {offset} ROWS FETCH NEXT {limit} ROWS ONLY")
  }

  fn column_types(&self) -> ColumnTypes {
    ColumnTypes {
      small_text:      "nvarchar(200)",
      large_text:      "nvarchar(max)",
      // Stays under the 900-byte index key ceiling.
      searchable_text: "nvarchar(450)",
      int:             "bigint",
      float:           "float",
      auto_pk:         "BIGINT IDENTITY(1,1) PRIMARY KEY",
    }
  }
}

impl SqlBackend for MssqlBackend {
  async fn execute(&self, sql: &str, params: &Params) -> Result<u64> {
    debug!(sql, "execute");
    let mut slot = self.client.lock().await;
    let client = slot.as_mut().ok_or_else(not_connected)?;
    let values: Vec<MsValue> = params.iter().map(|p| MsValue(&p.value)).collect();
    let refs: Vec<&dyn ToSql> = values.iter().map(|v| v as &dyn ToSql).collect();
    let result = client.execute(sql, &refs).await.map_err(Error::backend)?;
    Ok(result.total())
  }

  async fn query_one(&self, sql: &str, params: &Params) -> Result<Option<Row>> {
    let rows = self.query_all(sql, params).await?;
    Ok(rows.into_iter().next())
  }

  async fn query_all(&self, sql: &str, params: &Params) -> Result<Vec<Row>> {
    debug!(sql, "query_all");
    let mut slot = self.client.lock().await;
    let client = slot.as_mut().ok_or_else(not_connected)?;
    let values: Vec<MsValue> = params.iter().map(|p| MsValue(&p.value)).collect();
    let refs: Vec<&dyn ToSql> = values.iter().map(|v| v as &dyn ToSql).collect();
    let stream = client.query(sql, &refs).await.map_err(Error::backend)?;
    let rows = stream.into_first_result().await.map_err(Error::backend)?;
    Ok(decode_rows(rows))
  }

  async fn table_exists(&self, name: &str) -> Result<bool> {
    let mut slot = self.client.lock().await;
    let client = slot.as_mut().ok_or_else(not_connected)?;
    let stream = client
      .query(
        "SELECT 1 FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_NAME = @P1",
        &[&name],
      )
      .await
      .map_err(Error::backend)?;
    let rows = stream.into_first_result().await.map_err(Error::backend)?;
    Ok(!rows.is_empty())
  }

  async fn list_user_tables(&self) -> Result<Vec<String>> {
    let mut slot = self.client.lock().await;
    let client = slot.as_mut().ok_or_else(not_connected)?;
    let stream = client
      .query(
        "SELECT TABLE_NAME FROM INFORMATION_SCHEMA.TABLES
         WHERE TABLE_TYPE = 'BASE TABLE'",
        &[],
      )
      .await
      .map_err(Error::backend)?;
    let rows = stream.into_first_result().await.map_err(Error::backend)?;
    Ok(
      rows
        .iter()
        .filter_map(|r| r.get::<&str, _>(0).map(str::to_string))
        .collect(),
    )
  }

  async fn list_columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
    let mut slot = self.client.lock().await;
    let client = slot.as_mut().ok_or_else(not_connected)?;
    let stream = client
      .query(
        "SELECT COLUMN_NAME, DATA_TYPE FROM INFORMATION_SCHEMA.COLUMNS
         WHERE TABLE_NAME = @P1",
        &[&table],
      )
      .await
      .map_err(Error::backend)?;
    let rows = stream.into_first_result().await.map_err(Error::backend)?;
    Ok(
      rows
        .iter()
        .filter_map(|r| {
          Some(ColumnInfo {
            name:      r.get::<&str, _>(0)?.to_string(),
            data_type: r.get::<&str, _>(1)?.to_string(),
          })
        })
        .collect(),
    )
  }

  async fn close(&self) -> Result<()> {
    let mut slot = self.client.lock().await;
    if let Some(client) = slot.take() {
      client.close().await.map_err(Error::backend)?;
    }
    Ok(())
  }

  // T-SQL takes no COLUMN keyword here.
  async fn add_column(
    &self,
    table: &str,
    column: &str,
    ddl_type: &str,
  ) -> Result<()> {
    let sql = format!(
      "ALTER TABLE {} ADD {} {}",
      self.quote_ident(table),
      self.quote_ident(column),
      ddl_type,
    );
    self.execute(&sql, &Params::empty()).await?;
    Ok(())
  }
}
