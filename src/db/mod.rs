pub mod postgis;
pub mod table;

use table::GeoTable;

/// Destination able to append a table's rows to a named table.
pub trait TableSink {
    /// Append every row. Existing rows are never replaced or deduplicated.
    fn append(&mut self, table: &GeoTable, table_name: &str) -> anyhow::Result<()>;
}

impl<S: TableSink + ?Sized> TableSink for &mut S {
    fn append(&mut self, table: &GeoTable, table_name: &str) -> anyhow::Result<()> {
        (**self).append(table, table_name)
    }
}

impl<S: TableSink + ?Sized> TableSink for Box<S> {
    fn append(&mut self, table: &GeoTable, table_name: &str) -> anyhow::Result<()> {
        (**self).append(table, table_name)
    }
}

/// Writes a GeoJSON feature collection to a table of a geospatial database.
pub struct GeoJsonDbDataWriter<'a, S: TableSink> {
    sink: S,
    feature_collection: &'a geojson::FeatureCollection,
    table_name: &'a str,
    crs: Option<&'a str>,
}

impl<'a, S: TableSink> GeoJsonDbDataWriter<'a, S> {
    pub fn new(
        sink: S,
        feature_collection: &'a geojson::FeatureCollection,
        table_name: &'a str,
        crs: Option<&'a str>,
    ) -> Self {
        Self {
            sink,
            feature_collection,
            table_name,
            crs,
        }
    }

    /// Append the collection to the table.
    ///
    /// A collection that cannot be turned into rows is an error. A failure of the database itself
    /// is logged and swallowed: the write is then a no-op and this returns `Ok`.
    pub fn write(&mut self) -> anyhow::Result<()> {
        let table = GeoTable::from_features(self.feature_collection)?.with_crs(self.crs);
        match self.sink.append(&table, self.table_name) {
            Ok(()) => log::info!(
                "{} features have been successfully written to table {}",
                table.len(),
                self.table_name
            ),
            Err(err) => log::error!(
                "Error writing GeoJSON data to table {}: {:#}",
                self.table_name,
                err
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
pub mod testing {
    use std::collections::HashMap;

    use anyhow::anyhow;

    use super::{table::GeoTable, TableSink};

    /// Keeps appended tables in memory, keyed by table name.
    #[derive(Debug, Default)]
    pub struct MemorySink {
        pub tables: HashMap<String, Vec<GeoTable>>,
    }

    impl MemorySink {
        pub fn row_count(&self, table_name: &str) -> usize {
            self.tables
                .get(table_name)
                .map_or(0, |tables| tables.iter().map(GeoTable::len).sum())
        }
    }

    impl TableSink for MemorySink {
        fn append(&mut self, table: &GeoTable, table_name: &str) -> anyhow::Result<()> {
            self.tables
                .entry(table_name.to_owned())
                .or_default()
                .push(table.clone());
            Ok(())
        }
    }

    pub struct FailingSink;

    impl TableSink for FailingSink {
        fn append(&mut self, _table: &GeoTable, table_name: &str) -> anyhow::Result<()> {
            Err(anyhow!("relation \"{}\" does not exist", table_name))
        }
    }
}
