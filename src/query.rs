use tracing::debug;

use crate::{
    dto::LocationRow,
    store::{LocationStore, StoreError},
};

pub async fn last_position(
    store: &LocationStore,
    device: &str,
) -> Result<Option<LocationRow>, StoreError> {
    let row = store.latest_by_device(device).await?;
    debug!("Last position for {:?}: found={}", device, row.is_some());
    Ok(row)
}

/// Latest `(lat, lon)` for `device`. A latest report without a complete fix
/// counts as not found; older reports are never consulted instead.
pub async fn last_coordinates(
    store: &LocationStore,
    device: &str,
) -> Result<Option<(f64, f64)>, StoreError> {
    Ok(store
        .latest_coordinates(device)
        .await?
        .and_then(|coordinates| coordinates.fix()))
}

/// Fill `{lat}` and `{lon}` in a map URL template.
pub fn map_link(template: &str, lat: f64, lon: f64) -> String {
    template
        .replace("{lat}", &lat.to_string())
        .replace("{lon}", &lon.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        record::TelemetryRecord, store::tests::temp_store, util::config::DEFAULT_MAP_URL_TEMPLATE,
    };
    use tempfile::TempDir;

    #[test]
    fn map_link_fills_both_placeholders() {
        assert_eq!(
            map_link(DEFAULT_MAP_URL_TEMPLATE, 10.5, -20.25),
            "https://www.google.com/maps/search/?api=1&query=10.5,-20.25"
        );
        assert_eq!(
            map_link("https://osm.org/?mlat={lat}&mlon={lon}#map=16/{lat}/{lon}", 1.0, 2.5),
            "https://osm.org/?mlat=1&mlon=2.5#map=16/1/2.5"
        );
    }

    #[tokio::test]
    async fn incomplete_latest_fix_is_not_found() {
        let dir = TempDir::new().unwrap();
        let (store, _) = temp_store(&dir).await;

        store
            .append(&TelemetryRecord {
                device: Some("dev1".into()),
                lat: Some(10.5),
                lon: Some(-20.25),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(last_coordinates(&store, "dev1").await.unwrap(), Some((10.5, -20.25)));

        store
            .append(&TelemetryRecord {
                device: Some("dev1".into()),
                lat: Some(11.0),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(last_coordinates(&store, "dev1").await.unwrap(), None);

        let last = last_position(&store, "dev1").await.unwrap().unwrap();
        assert_eq!(last.lat, Some(11.0));
        assert_eq!(last.lon, None);
    }
}
