use anyhow::{anyhow, Context};
use gdal::vector::LayerAccess;
use indicatif::ProgressBar;

use super::{table::GeoTable, TableSink};
use crate::{config::settings::DbConnection, crs::crs_utils::spatial_ref_from_label};

const POSTGRESQL_DRIVERS: &[&str] = &["PostgreSQL"];

/// Appends tables to a PostGIS database through GDAL's PostgreSQL driver.
///
/// A connection is opened for every append and closed when it returns. Target tables must already
/// exist with columns matching the property names.
pub struct PostgisSink {
    connection: DbConnection,
}

impl PostgisSink {
    pub fn new(connection: DbConnection) -> Self {
        Self { connection }
    }

    fn open_dataset(&self) -> anyhow::Result<gdal::Dataset> {
        gdal::DriverManager::register_all();
        let mut open_options = gdal::DatasetOptions::default();
        open_options.open_flags =
            gdal::GdalOpenFlags::GDAL_OF_VECTOR | gdal::GdalOpenFlags::GDAL_OF_UPDATE;
        open_options.allowed_drivers = Some(POSTGRESQL_DRIVERS);
        gdal::Dataset::open_ex(self.connection.connection_string(), open_options).with_context(|| {
            format!(
                "Connecting to database {} on {}:{}",
                self.connection.database, self.connection.host, self.connection.port
            )
        })
    }
}

impl TableSink for PostgisSink {
    fn append(&mut self, table: &GeoTable, table_name: &str) -> anyhow::Result<()> {
        if table.is_empty() {
            log::info!("No rows to append to {}", table_name);
            return Ok(());
        }
        let spatial_ref = table
            .crs
            .as_deref()
            .map(spatial_ref_from_label)
            .transpose()?;

        let dataset = self.open_dataset()?;
        let mut layer = dataset
            .layer_by_name(table_name)
            .with_context(|| format!("Table {} not found", table_name))?;

        log::info!("Appending {} rows to {}", table.len(), table_name);
        unsafe {
            // One transaction for the whole append, so a failing row leaves the table untouched.
            gdal_sys::OGR_L_StartTransaction(layer.c_layer());
        };
        let result = append_rows(&mut layer, table, spatial_ref.as_ref());
        unsafe {
            match result {
                Ok(()) => gdal_sys::OGR_L_CommitTransaction(layer.c_layer()),
                Err(_) => gdal_sys::OGR_L_RollbackTransaction(layer.c_layer()),
            };
        };
        result
    }
}

fn append_rows(
    layer: &mut gdal::vector::Layer,
    table: &GeoTable,
    spatial_ref: Option<&gdal::spatial_ref::SpatialRef>,
) -> anyhow::Result<()> {
    let bar = ProgressBar::new(table.len() as u64);
    for row in &table.rows {
        let wkb = wkb::geom_to_wkb(&row.geometry)
            .map_err(|err| anyhow!("Could not write geometry to WKB, {:?}", err))?;
        let mut geometry = gdal::vector::Geometry::from_wkb(&wkb)?;
        if let Some(spatial_ref) = spatial_ref {
            geometry.set_spatial_ref(spatial_ref.clone());
        }

        let mut field_names = Vec::new();
        let mut values = Vec::new();
        if let Some(attributes) = &row.attributes {
            for column in &table.columns {
                if let Some(value) = attributes.get(column) {
                    field_names.push(column.as_str());
                    values.push(gdal::vector::FieldValue::StringValue(value.to_owned()));
                }
            }
        }
        layer.create_feature_fields(geometry, &field_names, &values)?;
        bar.inc(1);
    }
    bar.finish_and_clear();
    Ok(())
}
