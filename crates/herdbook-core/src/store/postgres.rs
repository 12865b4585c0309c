use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::info;
use uuid::Uuid;

use super::MeasurementStore;
use crate::error::StoreError;
use crate::types::{
    Cow, Measurement, MeasurementQuery, NewCow, NewMeasurement, NewSensor, Page, Sensor,
    SensorKind, StoreCounts, Upserted,
};
use crate::validation::assess_value;

const MEASUREMENT_COLUMNS: &str = "m.id, m.cow_id, m.sensor_id, s.kind, m.recorded_at, m.value, \
     m.unit, m.is_valid, m.validation_error, m.created_at";

/// Postgres-backed store over the `cows`, `sensors` and `measurements` tables.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn cow_from_row(row: &PgRow) -> Result<Cow, sqlx::Error> {
    Ok(Cow {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        breed: row.try_get("breed")?,
        birthdate: row.try_get("birthdate")?,
        created_at: row.try_get("created_at")?,
    })
}

fn sensor_from_row(row: &PgRow) -> Result<Sensor, sqlx::Error> {
    Ok(Sensor {
        id: row.try_get("id")?,
        kind: SensorKind::from(row.try_get::<String, _>("kind")?),
        unit: row.try_get("unit")?,
        cow_id: row.try_get("cow_id")?,
        created_at: row.try_get("created_at")?,
    })
}

fn measurement_from_row(row: &PgRow) -> Result<Measurement, sqlx::Error> {
    Ok(Measurement {
        id: row.try_get("id")?,
        cow_id: row.try_get("cow_id")?,
        sensor_id: row.try_get("sensor_id")?,
        kind: SensorKind::from(row.try_get::<String, _>("kind")?),
        timestamp: row.try_get("recorded_at")?,
        value: row.try_get("value")?,
        unit: row.try_get("unit")?,
        is_valid: row.try_get("is_valid")?,
        validation_error: row.try_get("validation_error")?,
        created_at: row.try_get("created_at")?,
    })
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &MeasurementQuery) {
    builder.push(" WHERE TRUE");
    if let Some(cow_id) = query.cow_id {
        builder.push(" AND m.cow_id = ").push_bind(cow_id);
    }
    if let Some(sensor_id) = query.sensor_id {
        builder.push(" AND m.sensor_id = ").push_bind(sensor_id);
    }
    if let Some(kind) = &query.kind {
        builder.push(" AND s.kind = ").push_bind(kind.as_str().to_string());
    }
    if let Some(range) = query.range {
        if let Some(start) = range.start {
            builder.push(" AND m.recorded_at >= ").push_bind(start);
        }
        if let Some(end) = range.end {
            builder.push(" AND m.recorded_at < ").push_bind(end);
        }
    }
    if query.valid_only {
        builder.push(" AND m.is_valid");
    }
    if let Some((timestamp, id)) = query.after {
        builder
            .push(" AND (m.recorded_at, m.id) > (")
            .push_bind(timestamp)
            .push(", ")
            .push_bind(id)
            .push(")");
    }
}

fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_usize(value: i64) -> usize {
    usize::try_from(value).unwrap_or(0)
}

fn upserted(rows_affected: u64) -> Upserted {
    if rows_affected == 0 {
        Upserted::Existing
    } else {
        Upserted::Created
    }
}

#[async_trait]
impl MeasurementStore for PostgresStore {
    async fn upsert_cow(&self, cow: &NewCow) -> Result<Upserted, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO cows (id, name, breed, birthdate)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(cow.id)
        .bind(&cow.name)
        .bind(&cow.breed)
        .bind(cow.birthdate)
        .execute(&self.pool)
        .await?;
        Ok(upserted(result.rows_affected()))
    }

    async fn upsert_sensor(&self, sensor: &NewSensor) -> Result<Upserted, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO sensors (id, kind, unit, cow_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(sensor.id)
        .bind(sensor.kind.as_str())
        .bind(&sensor.unit)
        .bind(sensor.cow_id)
        .execute(&self.pool)
        .await?;
        Ok(upserted(result.rows_affected()))
    }

    async fn insert_measurement(
        &self,
        new: &NewMeasurement,
    ) -> Result<Measurement, StoreError> {
        let sensor = sqlx::query("SELECT kind, unit FROM sensors WHERE id = $1")
            .bind(new.sensor_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::Invalid(format!("sensor {} does not exist", new.sensor_id)))?;
        let kind = SensorKind::from(sensor.try_get::<String, _>("kind")?);
        let unit = match &new.unit {
            Some(unit) => unit.clone(),
            None => sensor.try_get("unit")?,
        };
        let assessment = assess_value(&kind, new.value);

        // A missing cow surfaces as a foreign key violation (Invalid).
        let row = sqlx::query(
            r#"
            INSERT INTO measurements
                (cow_id, sensor_id, recorded_at, value, unit, is_valid, validation_error)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT ON CONSTRAINT uq_measurements_reading DO NOTHING
            RETURNING id, created_at
            "#,
        )
        .bind(new.cow_id)
        .bind(new.sensor_id)
        .bind(new.timestamp)
        .bind(new.value)
        .bind(&unit)
        .bind(assessment.is_valid)
        .bind(&assessment.validation_error)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Err(StoreError::Conflict(format!(
                "measurement for cow {} sensor {} at {} already exists",
                new.cow_id, new.sensor_id, new.timestamp
            )));
        };

        Ok(Measurement {
            id: row.try_get("id")?,
            cow_id: new.cow_id,
            sensor_id: new.sensor_id,
            kind,
            timestamp: new.timestamp,
            value: new.value,
            unit,
            is_valid: assessment.is_valid,
            validation_error: assessment.validation_error,
            created_at: row.try_get("created_at")?,
        })
    }

    async fn query_measurements(
        &self,
        query: &MeasurementQuery,
    ) -> Result<Vec<Measurement>, StoreError> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT ");
        builder.push(MEASUREMENT_COLUMNS);
        builder.push(" FROM measurements m JOIN sensors s ON s.id = m.sensor_id");
        push_filters(&mut builder, query);
        builder
            .push(" ORDER BY m.recorded_at, m.id OFFSET ")
            .push_bind(to_i64(query.offset))
            .push(" LIMIT ")
            .push_bind(to_i64(query.limit));

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| measurement_from_row(row).map_err(StoreError::from))
            .collect()
    }

    async fn count_measurements(&self, query: &MeasurementQuery) -> Result<usize, StoreError> {
        let mut builder = QueryBuilder::<Postgres>::new(
            "SELECT COUNT(*) FROM measurements m JOIN sensors s ON s.id = m.sensor_id",
        );
        push_filters(&mut builder, query);
        let count: i64 = builder.build_query_scalar::<i64>().fetch_one(&self.pool).await?;
        Ok(to_usize(count))
    }

    async fn get_cow(&self, id: Uuid) -> Result<Option<Cow>, StoreError> {
        let row = sqlx::query("SELECT id, name, breed, birthdate, created_at FROM cows WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(cow_from_row).transpose()?)
    }

    async fn list_cows(&self, offset: usize, limit: usize) -> Result<Page<Cow>, StoreError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cows")
            .fetch_one(&self.pool)
            .await?;
        let rows = sqlx::query(
            r#"
            SELECT id, name, breed, birthdate, created_at
            FROM cows
            ORDER BY name, id
            OFFSET $1 LIMIT $2
            "#,
        )
        .bind(to_i64(offset))
        .bind(to_i64(limit))
        .fetch_all(&self.pool)
        .await?;

        let items = rows.iter().map(cow_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(Page {
            items,
            total: to_usize(total),
        })
    }

    async fn get_sensor(&self, id: Uuid) -> Result<Option<Sensor>, StoreError> {
        let row = sqlx::query("SELECT id, kind, unit, cow_id, created_at FROM sensors WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(sensor_from_row).transpose()?)
    }

    async fn list_sensors(&self, offset: usize, limit: usize) -> Result<Page<Sensor>, StoreError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sensors")
            .fetch_one(&self.pool)
            .await?;
        let rows = sqlx::query(
            r#"
            SELECT id, kind, unit, cow_id, created_at
            FROM sensors
            ORDER BY id
            OFFSET $1 LIMIT $2
            "#,
        )
        .bind(to_i64(offset))
        .bind(to_i64(limit))
        .fetch_all(&self.pool)
        .await?;

        let items = rows.iter().map(sensor_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(Page {
            items,
            total: to_usize(total),
        })
    }

    async fn get_measurement(&self, id: i64) -> Result<Option<Measurement>, StoreError> {
        let sql = format!(
            "SELECT {MEASUREMENT_COLUMNS} FROM measurements m \
             JOIN sensors s ON s.id = m.sensor_id WHERE m.id = $1"
        );
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        Ok(row.as_ref().map(measurement_from_row).transpose()?)
    }

    async fn latest_by_kind(&self, cow_id: Uuid) -> Result<Vec<Measurement>, StoreError> {
        let sql = format!(
            "SELECT DISTINCT ON (s.kind) {MEASUREMENT_COLUMNS} FROM measurements m \
             JOIN sensors s ON s.id = m.sensor_id \
             WHERE m.cow_id = $1 AND m.is_valid \
             ORDER BY s.kind, m.recorded_at DESC, m.id DESC"
        );
        let rows = sqlx::query(&sql).bind(cow_id).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| measurement_from_row(row).map_err(StoreError::from))
            .collect()
    }

    async fn delete_cow(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM cows WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_sensor(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM sensors WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_measurement(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM measurements WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn counts(&self) -> Result<StoreCounts, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM cows) AS cows,
                (SELECT COUNT(*) FROM sensors) AS sensors,
                (SELECT COUNT(*) FROM measurements) AS measurements
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(StoreCounts {
            cows: to_usize(row.try_get("cows")?),
            sensors: to_usize(row.try_get("sensors")?),
            measurements: to_usize(row.try_get("measurements")?),
        })
    }

    async fn wipe_all(&self) -> Result<StoreCounts, StoreError> {
        let mut tx = self.pool.begin().await?;
        let measurements = sqlx::query("DELETE FROM measurements")
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let sensors = sqlx::query("DELETE FROM sensors")
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let cows = sqlx::query("DELETE FROM cows")
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;

        info!(cows, sensors, measurements, "Wiped all records");
        Ok(StoreCounts {
            cows: cows as usize,
            sensors: sensors as usize,
            measurements: measurements as usize,
        })
    }
}
