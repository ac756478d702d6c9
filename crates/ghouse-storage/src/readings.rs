//! Sensor reading storage: air metric samples, air thresholds, soil
//! analyses and soil zones.
//!
//! Samples are keyed by zero-padded timestamp so range scans double as
//! time-range queries.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use crate::{Result, history_key, open_db};

const AIR_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("air_samples");
const THRESHOLDS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("air_thresholds");
const SOIL_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("soil_analyses");
const ZONES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("soil_zones");

/// One air quality sample. Fields are optional because sensors report
/// independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirSample {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub co2: Option<f64>,
    pub pressure: Option<f64>,
    pub recorded_at: i64,
}

/// Configured bounds for one air metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirThreshold {
    pub metric: String,
    pub min_value: f64,
    pub max_value: f64,
    pub unit: Option<String>,
    pub updated_at: i64,
}

impl AirThreshold {
    /// Whether a reading falls outside the configured bounds.
    pub fn is_breached(&self, value: f64) -> bool {
        value < self.min_value || value > self.max_value
    }
}

/// Aggregates over a window of air samples.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AirStats {
    pub count: u64,
    pub temperature: MetricStats,
    pub humidity: MetricStats,
    pub co2: MetricStats,
    pub pressure: MetricStats,
}

/// Min/max/avg for a single metric.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricStats {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
}

impl MetricStats {
    fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let sum: f64 = values.iter().sum();
        Self {
            min: values.iter().cloned().fold(None, |m, v| {
                Some(m.map_or(v, |m: f64| m.min(v)))
            }),
            max: values.iter().cloned().fold(None, |m, v| {
                Some(m.map_or(v, |m: f64| m.max(v)))
            }),
            avg: Some(sum / values.len() as f64),
        }
    }
}

/// One soil analysis result for a zone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoilSample {
    pub zone_id: Option<String>,
    pub moisture: Option<f64>,
    pub ph: Option<f64>,
    pub npk_n: Option<f64>,
    pub npk_p: Option<f64>,
    pub npk_k: Option<f64>,
    pub temperature: Option<f64>,
    pub conductivity: Option<f64>,
    /// optimal | warning | critical
    pub status: String,
    pub analyzed_at: i64,
}

/// A managed soil zone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoilZone {
    pub id: String,
    pub name: String,
    pub area_sqm: Option<f64>,
    pub coordinates: Vec<[f64; 2]>,
}

/// Store for air and soil sensor data.
pub struct ReadingStore {
    db: Arc<Database>,
}

impl ReadingStore {
    /// Open or create the store.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            db: open_db(path.as_ref())?,
        })
    }

    /// Append an air sample.
    pub fn record_air(&self, sample: &AirSample) -> Result<()> {
        let key = history_key(sample.recorded_at * 1000, "air");
        let value = serde_json::to_vec(sample)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(AIR_TABLE)?;
            table.insert(&*key, &*value)?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Most recent air sample, if any.
    pub fn latest_air(&self) -> Result<Option<AirSample>> {
        let txn = self.db.begin_read()?;
        let table = match txn.open_table(AIR_TABLE) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let result = match table.iter()?.next_back() {
            Some(entry) => {
                let (_key, value) = entry?;
                Ok(Some(serde_json::from_slice(value.value())?))
            }
            None => Ok(None),
        };
        result
    }

    /// Air samples recorded at or after `since` (unix seconds), oldest first.
    pub fn air_since(&self, since: i64) -> Result<Vec<AirSample>> {
        let txn = self.db.begin_read()?;
        let table = match txn.open_table(AIR_TABLE) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let start = format!("{:020}", (since * 1000).max(0));
        let mut results = Vec::new();
        for entry in table.range(&*start..)? {
            let (_key, value) = entry?;
            results.push(serde_json::from_slice(value.value())?);
        }
        Ok(results)
    }

    /// Min/max/avg over samples since the given timestamp.
    pub fn air_stats(&self, since: i64) -> Result<AirStats> {
        let samples = self.air_since(since)?;
        let collect = |f: fn(&AirSample) -> Option<f64>| -> Vec<f64> {
            samples.iter().filter_map(f).collect()
        };

        Ok(AirStats {
            count: samples.len() as u64,
            temperature: MetricStats::from_values(&collect(|s| s.temperature)),
            humidity: MetricStats::from_values(&collect(|s| s.humidity)),
            co2: MetricStats::from_values(&collect(|s| s.co2)),
            pressure: MetricStats::from_values(&collect(|s| s.pressure)),
        })
    }

    /// Write a threshold record.
    pub fn put_threshold(&self, threshold: &AirThreshold) -> Result<()> {
        let value = serde_json::to_vec(threshold)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(THRESHOLDS_TABLE)?;
            table.insert(&*threshold.metric, &*value)?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Threshold for one metric.
    pub fn threshold(&self, metric: &str) -> Result<Option<AirThreshold>> {
        let txn = self.db.begin_read()?;
        let table = match txn.open_table(THRESHOLDS_TABLE) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match table.get(metric)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// All configured thresholds.
    pub fn thresholds(&self) -> Result<Vec<AirThreshold>> {
        let txn = self.db.begin_read()?;
        let table = match txn.open_table(THRESHOLDS_TABLE) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut results = Vec::new();
        for entry in table.iter()? {
            let (_key, value) = entry?;
            results.push(serde_json::from_slice(value.value())?);
        }
        Ok(results)
    }

    /// Append a soil analysis.
    pub fn record_soil(&self, sample: &SoilSample) -> Result<()> {
        let zone = sample.zone_id.as_deref().unwrap_or("unzoned");
        let key = format!("{}:{}", zone, history_key(sample.analyzed_at * 1000, "soil"));
        let value = serde_json::to_vec(sample)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(SOIL_TABLE)?;
            table.insert(&*key, &*value)?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Soil analyses for a zone, newest first.
    pub fn soil_history(&self, zone_id: &str, limit: usize) -> Result<Vec<SoilSample>> {
        let txn = self.db.begin_read()?;
        let table = match txn.open_table(SOIL_TABLE) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let start = format!("{}:", zone_id);
        let end = format!("{}:\u{FFFF}", zone_id);
        let mut results = Vec::new();
        for entry in table.range(&*start..=&*end)?.rev().take(limit) {
            let (_key, value) = entry?;
            results.push(serde_json::from_slice(value.value())?);
        }
        Ok(results)
    }

    /// Latest analysis per known zone.
    pub fn latest_soil(&self, zone_id: &str) -> Result<Option<SoilSample>> {
        Ok(self.soil_history(zone_id, 1)?.into_iter().next())
    }

    /// Register or update a zone.
    pub fn put_zone(&self, zone: &SoilZone) -> Result<()> {
        let value = serde_json::to_vec(zone)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(ZONES_TABLE)?;
            table.insert(&*zone.id, &*value)?;
        }
        txn.commit()?;
        Ok(())
    }

    /// All registered zones.
    pub fn zones(&self) -> Result<Vec<SoilZone>> {
        let txn = self.db.begin_read()?;
        let table = match txn.open_table(ZONES_TABLE) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut results = Vec::new();
        for entry in table.iter()? {
            let (_key, value) = entry?;
            results.push(serde_json::from_slice(value.value())?);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, ReadingStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ReadingStore::open(dir.path().join("readings.redb")).unwrap();
        (dir, store)
    }

    fn sample(t: f64, recorded_at: i64) -> AirSample {
        AirSample {
            temperature: Some(t),
            humidity: Some(50.0),
            co2: None,
            pressure: Some(1013.0),
            recorded_at,
        }
    }

    #[test]
    fn test_air_roundtrip_and_latest() {
        let (_dir, store) = store();
        assert!(store.latest_air().unwrap().is_none());

        store.record_air(&sample(20.0, 100)).unwrap();
        store.record_air(&sample(22.0, 200)).unwrap();

        let latest = store.latest_air().unwrap().unwrap();
        assert_eq!(latest.temperature, Some(22.0));
    }

    #[test]
    fn test_air_since_filters_by_time() {
        let (_dir, store) = store();
        store.record_air(&sample(20.0, 100)).unwrap();
        store.record_air(&sample(22.0, 200)).unwrap();
        store.record_air(&sample(24.0, 300)).unwrap();

        let recent = store.air_since(200).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].temperature, Some(22.0));
    }

    #[test]
    fn test_air_stats() {
        let (_dir, store) = store();
        store.record_air(&sample(20.0, 100)).unwrap();
        store.record_air(&sample(24.0, 200)).unwrap();

        let stats = store.air_stats(0).unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.temperature.min, Some(20.0));
        assert_eq!(stats.temperature.max, Some(24.0));
        assert_eq!(stats.temperature.avg, Some(22.0));
        // co2 never reported
        assert!(stats.co2.avg.is_none());
    }

    #[test]
    fn test_threshold_breach() {
        let threshold = AirThreshold {
            metric: "co2".to_string(),
            min_value: 0.0,
            max_value: 1000.0,
            unit: Some("ppm".to_string()),
            updated_at: 0,
        };
        assert!(threshold.is_breached(1200.0));
        assert!(!threshold.is_breached(800.0));
    }

    #[test]
    fn test_soil_history_per_zone() {
        let (_dir, store) = store();
        let soil = |zone: &str, moisture: f64, at: i64| SoilSample {
            zone_id: Some(zone.to_string()),
            moisture: Some(moisture),
            ph: Some(6.5),
            npk_n: None,
            npk_p: None,
            npk_k: None,
            temperature: None,
            conductivity: None,
            status: "optimal".to_string(),
            analyzed_at: at,
        };

        store.record_soil(&soil("A", 40.0, 100)).unwrap();
        store.record_soil(&soil("A", 45.0, 200)).unwrap();
        store.record_soil(&soil("B", 50.0, 150)).unwrap();

        let a = store.soil_history("A", 10).unwrap();
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].moisture, Some(45.0));

        let latest_b = store.latest_soil("B").unwrap().unwrap();
        assert_eq!(latest_b.moisture, Some(50.0));
    }
}
