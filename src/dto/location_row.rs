use serde::Serialize;
use sqlx::FromRow;

/// Insertion sequence assigned by SQLite; the only ordering used for "latest".
pub type RowId = i64;

#[derive(Clone, Debug, PartialEq, FromRow, Serialize)]
pub struct LocationRow {
    #[serde(skip)]
    pub id: RowId,
    pub device: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub alt: Option<f64>,
    pub hdop: Option<f64>,
    pub time: Option<String>,
    pub pressure: Option<f64>,
    pub temp: Option<f64>,
    pub received_at: String,
}

#[derive(Clone, Copy, Debug, PartialEq, FromRow)]
pub struct Coordinates {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

impl Coordinates {
    /// Both halves of the fix, if the device reported them.
    pub fn fix(&self) -> Option<(f64, f64)> {
        self.lat.zip(self.lon)
    }
}
