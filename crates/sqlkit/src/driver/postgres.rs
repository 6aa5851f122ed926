use super::Driver;
use crate::dialect::Dialect;
use crate::error::{SqlError, SqlResult};
use crate::row::Row;
use crate::value::Value;
use bytes::BytesMut;
use rust_decimal::Decimal;
use std::error::Error;
use std::sync::Arc;
use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};
use tokio_postgres::{Client, NoTls};

type BoxError = Box<dyn Error + Sync + Send>;

/// PostgreSQL handle.
///
/// tokio-postgres is async; this driver owns a current-thread runtime and
/// blocks on each call, so the connection task only makes progress while a
/// statement is in flight.
pub struct PostgresDriver {
    runtime: tokio::runtime::Runtime,
    client: Client,
}

impl PostgresDriver {
    /// Connect with a libpq-style connection string.
    pub fn connect(conn_str: &str) -> SqlResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let (client, connection) = runtime.block_on(tokio_postgres::connect(conn_str, NoTls))?;
        runtime.spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(target: "sqlkit.sql", error = %e, "postgres connection terminated");
            }
        });
        Ok(Self { runtime, client })
    }

    fn params(params: &[Value]) -> Vec<&(dyn ToSql + Sync)> {
        params.iter().map(|v| v as &(dyn ToSql + Sync)).collect()
    }
}

impl Driver for PostgresDriver {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> SqlResult<Vec<Row>> {
        let sql = Dialect::number_placeholders(sql);
        let refs = Self::params(params);
        let rows = self.runtime.block_on(self.client.query(sql.as_str(), &refs))?;

        let Some(first) = rows.first() else {
            return Ok(Vec::new());
        };
        let columns: Arc<[String]> = first.columns().iter().map(|c| c.name().to_string()).collect();
        rows.iter()
            .map(|row| {
                let values = (0..columns.len())
                    .map(|i| decode(row, i))
                    .collect::<SqlResult<Vec<_>>>()?;
                Ok(Row::new(Arc::clone(&columns), values))
            })
            .collect()
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> SqlResult<u64> {
        let sql = Dialect::number_placeholders(sql);
        let refs = Self::params(params);
        Ok(self.runtime.block_on(self.client.execute(sql.as_str(), &refs))?)
    }

    fn execute_batch(&mut self, sql: &str) -> SqlResult<()> {
        Ok(self.runtime.block_on(self.client.batch_execute(sql))?)
    }

    fn last_insert_id(&mut self) -> SqlResult<Option<i64>> {
        let row = self
            .runtime
            .block_on(self.client.query_one("SELECT lastval()", &[]))?;
        Ok(row.try_get::<_, Option<i64>>(0)?)
    }
}

fn decode(row: &tokio_postgres::Row, i: usize) -> SqlResult<Value> {
    let column = &row.columns()[i];
    let ty = column.type_();
    let value = match *ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(i)?.into(),
        Type::INT2 => row.try_get::<_, Option<i16>>(i)?.into(),
        Type::INT4 => row.try_get::<_, Option<i32>>(i)?.into(),
        Type::INT8 => row.try_get::<_, Option<i64>>(i)?.into(),
        Type::OID => row.try_get::<_, Option<u32>>(i)?.into(),
        Type::FLOAT4 => row.try_get::<_, Option<f32>>(i)?.into(),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(i)?.into(),
        Type::NUMERIC => row
            .try_get::<_, Option<Decimal>>(i)?
            .map(|d| d.to_string())
            .into(),
        Type::BYTEA => row.try_get::<_, Option<Vec<u8>>>(i)?.into(),
        Type::TIMESTAMP => row.try_get::<_, Option<chrono::NaiveDateTime>>(i)?.into(),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(i)?
            .into(),
        Type::DATE => row.try_get::<_, Option<chrono::NaiveDate>>(i)?.into(),
        Type::JSON | Type::JSONB => row.try_get::<_, Option<serde_json::Value>>(i)?.into(),
        Type::UUID => row.try_get::<_, Option<uuid::Uuid>>(i)?.into(),
        _ => row
            .try_get::<_, Option<String>>(i)
            .map_err(|e| SqlError::decode(column.name(), format!("unsupported type {ty}: {e}")))?
            .into(),
    };
    Ok(value)
}

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => match *ty {
                Type::BOOL => b.to_sql(ty, out),
                _ => Value::Int(i64::from(*b)).to_sql(ty, out),
            },
            Value::Int(v) => match *ty {
                Type::INT2 => i16::try_from(*v)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*v)?.to_sql(ty, out),
                Type::INT8 => v.to_sql(ty, out),
                Type::OID => u32::try_from(*v)?.to_sql(ty, out),
                Type::FLOAT4 => (*v as f32).to_sql(ty, out),
                Type::FLOAT8 => (*v as f64).to_sql(ty, out),
                Type::NUMERIC => Decimal::from(*v).to_sql(ty, out),
                Type::BOOL => (*v != 0).to_sql(ty, out),
                _ if is_text(ty) => v.to_string().to_sql(ty, out),
                _ => Err(mismatch(self, ty)),
            },
            Value::Float(v) => match *ty {
                Type::FLOAT4 => (*v as f32).to_sql(ty, out),
                Type::FLOAT8 => v.to_sql(ty, out),
                Type::NUMERIC => Decimal::try_from(*v)?.to_sql(ty, out),
                Type::INT2 | Type::INT4 | Type::INT8 if v.fract() == 0.0 => {
                    Value::Int(*v as i64).to_sql(ty, out)
                }
                _ if is_text(ty) => v.to_string().to_sql(ty, out),
                _ => Err(mismatch(self, ty)),
            },
            Value::Text(s) => match *ty {
                Type::INT2 => s.parse::<i16>()?.to_sql(ty, out),
                Type::INT4 => s.parse::<i32>()?.to_sql(ty, out),
                Type::INT8 => s.parse::<i64>()?.to_sql(ty, out),
                Type::FLOAT4 => s.parse::<f32>()?.to_sql(ty, out),
                Type::FLOAT8 => s.parse::<f64>()?.to_sql(ty, out),
                Type::NUMERIC => s.trim().parse::<Decimal>()?.to_sql(ty, out),
                Type::BOOL => matches!(s.as_str(), "1" | "t" | "true").to_sql(ty, out),
                Type::DATE => chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")?.to_sql(ty, out),
                Type::TIMESTAMP => parse_naive_timestamp(s)?.to_sql(ty, out),
                Type::TIMESTAMPTZ => parse_timestamptz(s)?.to_sql(ty, out),
                Type::JSON | Type::JSONB => {
                    serde_json::from_str::<serde_json::Value>(s)?.to_sql(ty, out)
                }
                Type::UUID => uuid::Uuid::parse_str(s)?.to_sql(ty, out),
                Type::BYTEA => s.as_bytes().to_sql(ty, out),
                _ if is_text(ty) => s.as_str().to_sql(ty, out),
                _ => Err(mismatch(self, ty)),
            },
            Value::Bytes(b) => match *ty {
                Type::BYTEA => b.as_slice().to_sql(ty, out),
                _ => Err(mismatch(self, ty)),
            },
        }
    }

    fn accepts(ty: &Type) -> bool {
        is_text(ty)
            || matches!(
                *ty,
                Type::BOOL
                    | Type::INT2
                    | Type::INT4
                    | Type::INT8
                    | Type::OID
                    | Type::FLOAT4
                    | Type::FLOAT8
                    | Type::NUMERIC
                    | Type::DATE
                    | Type::TIMESTAMP
                    | Type::TIMESTAMPTZ
                    | Type::JSON
                    | Type::JSONB
                    | Type::UUID
                    | Type::BYTEA
            )
    }

    to_sql_checked!();
}

fn is_text(ty: &Type) -> bool {
    matches!(
        *ty,
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN
    )
}

fn mismatch(value: &Value, ty: &Type) -> BoxError {
    format!("cannot bind {} value to a column of type {ty}", value.type_name()).into()
}

fn parse_naive_timestamp(s: &str) -> Result<chrono::NaiveDateTime, chrono::ParseError> {
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
}

/// RFC 3339, or a zone-less timestamp taken as UTC.
fn parse_timestamptz(s: &str) -> Result<chrono::DateTime<chrono::Utc>, chrono::ParseError> {
    match chrono::DateTime::parse_from_rfc3339(s) {
        Ok(dt) => Ok(dt.with_timezone(&chrono::Utc)),
        Err(e) => parse_naive_timestamp(s)
            .map(|naive| naive.and_utc())
            .map_err(|_| e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bind(value: Value, ty: &Type) -> Result<BytesMut, BoxError> {
        let mut buf = BytesMut::new();
        value.to_sql_checked(ty, &mut buf)?;
        Ok(buf)
    }

    fn bind_decimal(d: Decimal) -> BytesMut {
        let mut buf = BytesMut::new();
        d.to_sql(&Type::NUMERIC, &mut buf).unwrap();
        buf
    }

    #[test]
    fn binds_int_to_int4() {
        assert_eq!(&bind(Value::Int(7), &Type::INT4).unwrap()[..], &7_i32.to_be_bytes());
        assert!(bind(Value::Int(i64::MAX), &Type::INT4).is_err());
    }

    #[test]
    fn binds_numeric_in_binary_form() {
        let ten_fifty: Decimal = "10.50".parse().unwrap();
        assert_eq!(bind(Value::from("10.50"), &Type::NUMERIC).unwrap(), bind_decimal(ten_fifty));
        assert_eq!(bind(Value::Int(10), &Type::NUMERIC).unwrap(), bind_decimal(Decimal::from(10)));
        assert_eq!(
            bind(Value::Float(10.5), &Type::NUMERIC).unwrap(),
            bind_decimal("10.5".parse().unwrap())
        );
        assert!(bind(Value::from("ten"), &Type::NUMERIC).is_err());
        assert!(bind(Value::Float(f64::NAN), &Type::NUMERIC).is_err());
    }

    #[test]
    fn binds_timestamps_from_text() {
        let ts = chrono::NaiveDate::from_ymd_opt(2024, 5, 6)
            .unwrap()
            .and_hms_opt(7, 8, 9)
            .unwrap();
        let mut expected = BytesMut::new();
        ts.to_sql(&Type::TIMESTAMP, &mut expected).unwrap();
        assert_eq!(bind(Value::from(ts), &Type::TIMESTAMP).unwrap(), expected);
        assert_eq!(bind(Value::from("2024-05-06T07:08:09"), &Type::TIMESTAMP).unwrap(), expected);

        let mut expected = BytesMut::new();
        ts.and_utc().to_sql(&Type::TIMESTAMPTZ, &mut expected).unwrap();
        assert_eq!(bind(Value::from(ts.and_utc()), &Type::TIMESTAMPTZ).unwrap(), expected);
        assert_eq!(bind(Value::from("2024-05-06 07:08:09"), &Type::TIMESTAMPTZ).unwrap(), expected);
    }

    #[test]
    fn rejects_mismatched_types_instead_of_sending_text() {
        assert!(bind(Value::Int(1), &Type::UUID).is_err());
        assert!(bind(Value::Bytes(vec![1]), &Type::INT4).is_err());
        assert!(bind(Value::Int(1), &Type::POINT).is_err());
        assert_eq!(&bind(Value::Int(42), &Type::TEXT).unwrap()[..], b"42");
    }
}
