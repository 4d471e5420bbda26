// InfluxDB store implementation
//
// Points live in one measurement with second precision timestamps. device_id
// is the only tag, so a point's identity (measurement + tags + time) is the
// record's natural key and a rewrite replaces it even when the room changed.
// room_id is a string field.
use crate::application::telemetry_store::TelemetryStore;
use crate::domain::error::StoreError;
use crate::domain::filter::TimeRange;
use crate::domain::telemetry::{
    DeviceId, DeviceStatus, RawTelemetryRecord, RoomId, TelemetryRecord, format_timestamp,
};
use crate::infrastructure::config::InfluxSettings;
use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct InfluxTelemetryStore {
    client: reqwest::Client,
    host: String,
    token: String,
    database: String,
    retention_policy: String,
    measurement: String,
    max_batch_size: usize,
}

#[derive(Debug, Deserialize)]
struct InfluxQLResponse {
    results: Vec<InfluxQLResult>,
}

#[derive(Debug, Deserialize)]
struct InfluxQLResult {
    #[serde(default)]
    series: Option<Vec<InfluxQLSeries>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InfluxQLSeries {
    #[allow(dead_code)]
    name: String,
    columns: Vec<String>,
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

impl InfluxTelemetryStore {
    pub fn new(settings: &InfluxSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            host: settings.host.trim_end_matches('/').to_string(),
            token: settings.token.clone(),
            database: settings.database.clone(),
            retention_policy: settings.retention_policy.clone(),
            measurement: settings.measurement.clone(),
            max_batch_size: settings.max_batch_size.max(1),
        }
    }

    fn build_query_url(&self, query: &str) -> String {
        format!(
            "{}/query?db={}&rp={}&epoch=s&q={}",
            self.host,
            urlencoding::encode(&self.database),
            urlencoding::encode(&self.retention_policy),
            urlencoding::encode(query)
        )
    }

    fn build_write_url(&self) -> String {
        format!(
            "{}/write?db={}&rp={}&precision=s",
            self.host,
            urlencoding::encode(&self.database),
            urlencoding::encode(&self.retention_policy)
        )
    }

    async fn execute_query(&self, query: &str) -> Result<InfluxQLResponse, StoreError> {
        tracing::debug!("Executing InfluxQL query: {}", query);

        let response = self
            .client
            .get(self.build_query_url(query))
            .header("Authorization", format!("Token {}", self.token))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.without_url().to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::QueryFailed(format!(
                "InfluxDB returned {}: {}",
                status,
                truncate(&body)
            )));
        }

        let data = response
            .json::<InfluxQLResponse>()
            .await
            .map_err(|e| {
                StoreError::QueryFailed(format!(
                    "unreadable InfluxDB response: {}",
                    e.without_url()
                ))
            })?;

        if let Some(error) = data.results.first().and_then(|r| r.error.as_ref()) {
            return Err(StoreError::QueryFailed(format!("InfluxDB query error: {}", error)));
        }

        Ok(data)
    }

    fn select_clause(&self) -> String {
        format!(
            "SELECT \"device_id\", \"room_id\", \"temperature\", \"device_status\" FROM \"{}\"",
            self.measurement
        )
    }

    fn device_query(&self, device_id: &DeviceId, range: &TimeRange) -> String {
        format!(
            "{} WHERE \"device_id\" = '{}'{}",
            self.select_clause(),
            device_id,
            time_clause(range)
        )
    }

    fn room_query(&self, room_id: &RoomId, range: &TimeRange) -> String {
        format!(
            "{} WHERE \"room_id\" = '{}'{}",
            self.select_clause(),
            room_id,
            time_clause(range)
        )
    }

    fn device_ids_query(&self) -> String {
        format!(
            "SHOW TAG VALUES FROM \"{}\" WITH KEY = \"device_id\"",
            self.measurement
        )
    }

    fn room_ids_query(&self) -> String {
        format!("SELECT DISTINCT(\"room_id\") FROM \"{}\"", self.measurement)
    }

    async fn select_records(&self, query: &str) -> Result<Vec<TelemetryRecord>, StoreError> {
        let response = self.execute_query(query).await?;
        rows_to_records(&response)
    }

    /// Second column of every row: the tag value or the distinct field value.
    async fn column_values(&self, query: &str) -> Result<Vec<String>, StoreError> {
        let response = self.execute_query(query).await?;

        let mut values = Vec::new();
        if let Some(series) = response.results.first().and_then(|r| r.series.as_ref()) {
            for s in series {
                for value_row in &s.values {
                    if let Some(value) = value_row.get(1).and_then(Value::as_str) {
                        values.push(value.to_string());
                    }
                }
            }
        }
        Ok(values)
    }

    /// Encode one record as a line-protocol point.
    fn to_line(&self, record: &TelemetryRecord) -> String {
        let mut fields = format!(
            "room_id=\"{}\",device_status=\"{}\"",
            record.room_id(),
            record.device_status()
        );
        if let Some(temperature) = record.temperature() {
            fields.push_str(&format!(",temperature={}", temperature));
        }

        format!(
            "{},device_id={} {} {}",
            escape_measurement(&self.measurement),
            record.device_id(),
            fields,
            record.timestamp().timestamp()
        )
    }
}

/// ` AND time >= ...s AND time <= ...s` for the bounded sides of `range`.
fn time_clause(range: &TimeRange) -> String {
    let mut clause = String::new();
    if let Some(start) = range.start {
        clause.push_str(&format!(" AND time >= {}s", start.timestamp()));
    }
    if let Some(end) = range.end {
        clause.push_str(&format!(" AND time <= {}s", end.timestamp()));
    }
    clause
}

fn escape_measurement(name: &str) -> String {
    name.replace(',', "\\,").replace(' ', "\\ ")
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

/// Convert selected rows back into validated records.
fn rows_to_records(response: &InfluxQLResponse) -> Result<Vec<TelemetryRecord>, StoreError> {
    let mut records = Vec::new();
    let Some(series) = response.results.first().and_then(|r| r.series.as_ref()) else {
        return Ok(records);
    };

    for s in series {
        let column = |name: &str| s.columns.iter().position(|c| c == name);
        let (Some(time_idx), Some(device_idx), Some(room_idx), Some(status_idx)) = (
            column("time"),
            column("device_id"),
            column("room_id"),
            column("device_status"),
        ) else {
            return Err(StoreError::QueryFailed(format!(
                "unexpected columns: {:?}",
                s.columns
            )));
        };
        let temp_idx = column("temperature");

        for row in &s.values {
            let text = |idx: usize| row.get(idx).and_then(Value::as_str).unwrap_or_default();
            let timestamp = row
                .get(time_idx)
                .and_then(Value::as_i64)
                .and_then(|secs| DateTime::from_timestamp(secs, 0))
                .ok_or_else(|| {
                    StoreError::QueryFailed(format!("bad time value in row {:?}", row))
                })?;

            // Fields of a rewritten point are merged, so a temperature left by an
            // earlier reading of the same key is dropped for sensor errors.
            let status = text(status_idx);
            let temperature = if status == DeviceStatus::SensorError.as_str() {
                None
            } else {
                temp_idx.and_then(|idx| row.get(idx)).and_then(Value::as_f64)
            };
            let raw = RawTelemetryRecord {
                device_id: text(device_idx).to_string(),
                room_id: text(room_idx).to_string(),
                timestamp: format_timestamp(&timestamp),
                temperature,
                device_status: status.to_string(),
            };
            let record = raw
                .validate()
                .map_err(|e| StoreError::QueryFailed(format!("stored row rejected: {}", e)))?;
            records.push(record);
        }
    }

    Ok(records)
}

#[async_trait]
impl TelemetryStore for InfluxTelemetryStore {
    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    async fn scan(&self) -> Result<Vec<TelemetryRecord>, StoreError> {
        self.select_records(&self.select_clause()).await
    }

    async fn scan_device_ids(&self) -> Result<Vec<DeviceId>, StoreError> {
        self.column_values(&self.device_ids_query())
            .await?
            .into_iter()
            .map(|raw| {
                DeviceId::try_from(raw).map_err(|e| StoreError::QueryFailed(e.to_string()))
            })
            .collect()
    }

    async fn scan_room_ids(&self) -> Result<Vec<RoomId>, StoreError> {
        self.column_values(&self.room_ids_query())
            .await?
            .into_iter()
            .map(|raw| RoomId::try_from(raw).map_err(|e| StoreError::QueryFailed(e.to_string())))
            .collect()
    }

    async fn query_device(
        &self,
        device_id: &DeviceId,
        range: &TimeRange,
    ) -> Result<Vec<TelemetryRecord>, StoreError> {
        if range.is_empty() {
            return Ok(Vec::new());
        }
        self.select_records(&self.device_query(device_id, range)).await
    }

    async fn query_room(
        &self,
        room_id: &RoomId,
        range: &TimeRange,
    ) -> Result<Vec<TelemetryRecord>, StoreError> {
        if range.is_empty() {
            return Ok(Vec::new());
        }
        self.select_records(&self.room_query(room_id, range)).await
    }

    async fn write_batch(&self, records: &[TelemetryRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        if records.len() > self.max_batch_size {
            return Err(StoreError::WriteRejected(format!(
                "batch of {} exceeds the limit of {}",
                records.len(),
                self.max_batch_size
            )));
        }

        let body = records
            .iter()
            .map(|r| self.to_line(r))
            .collect::<Vec<_>>()
            .join("\n");

        let response = self
            .client
            .post(self.build_write_url())
            .header("Authorization", format!("Token {}", self.token))
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.without_url().to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::WriteRejected(format!(
                "InfluxDB returned {}: {}",
                status,
                truncate(&body)
            )));
        }

        tracing::debug!(points = records.len(), "wrote points to InfluxDB");
        Ok(())
    }
}
