//! Category-aware cleanup applied to every batch before loading
//!
//! Steps, in order:
//! 1. Trim column names and replace interior spaces with `_`; names that
//!    collide afterwards get `.1`, `.2` suffixes
//! 2. Category-specific fills (product files: missing `Product_Type` becomes `Unknown`)
//! 3. Missing cells in numeric columns become zero
//! 4. Provenance columns are appended

use chrono::{DateTime, Utc};
use dropzone_common::Category;

use crate::table::{ColumnType, TabularBatch, Value};

pub const NAME_SEPARATOR: &str = "_";
pub const PRODUCT_TYPE_COLUMN: &str = "Product_Type";
pub const UNKNOWN_PRODUCT_TYPE: &str = "Unknown";

pub const SOURCE_FILE_COLUMN: &str = "Source_File";
pub const LOAD_TIMESTAMP_COLUMN: &str = "Load_Timestamp";
pub const FILE_DROP_TIME_COLUMN: &str = "File_Drop_Time";

/// Where a batch came from and when
#[derive(Debug, Clone)]
pub struct Provenance {
    /// File name inside the watched folder
    pub file_id: String,
    pub loaded_at: DateTime<Utc>,
    /// Last-modified time of the source file
    pub modified_at: DateTime<Utc>,
}

/// Normalize a parsed batch for the given category.
///
/// Rows are neither added nor dropped; the output has the input's columns
/// (renamed) followed by the provenance columns.
pub fn normalize(mut batch: TabularBatch, category: Category, provenance: &Provenance) -> TabularBatch {
    batch.rename_columns(clean_column_name);

    match category {
        Category::Product => fill_missing_text(&mut batch, PRODUCT_TYPE_COLUMN, UNKNOWN_PRODUCT_TYPE),
        Category::Summary => {},
    }

    fill_missing_numeric(&mut batch);
    append_provenance(&mut batch, provenance);
    batch
}

/// `" Unit Price "` -> `"Unit_Price"`
pub fn clean_column_name(name: &str) -> String {
    name.trim().replace(' ', NAME_SEPARATOR)
}

/// Fill nulls in `name` with `fill`, converting the column to text
fn fill_missing_text(batch: &mut TabularBatch, name: &str, fill: &str) {
    let Some(column) = batch.column_mut(name) else {
        return;
    };

    column.kind = ColumnType::Text;
    for value in column.values.iter_mut() {
        *value = Value::Text(value.to_text().unwrap_or_else(|| fill.to_string()));
    }
}

fn fill_missing_numeric(batch: &mut TabularBatch) {
    for column in batch.columns_mut() {
        let zero = match column.kind {
            ColumnType::Integer => Value::Integer(0),
            ColumnType::Float => Value::Float(0.0),
            _ => continue,
        };
        for value in column.values.iter_mut().filter(|v| v.is_null()) {
            *value = zero.clone();
        }
    }
}

fn append_provenance(batch: &mut TabularBatch, provenance: &Provenance) {
    batch.set_constant(SOURCE_FILE_COLUMN, ColumnType::Text, Value::Text(provenance.file_id.clone()));
    batch.set_constant(
        LOAD_TIMESTAMP_COLUMN,
        ColumnType::Timestamp,
        Value::Timestamp(provenance.loaded_at),
    );
    batch.set_constant(
        FILE_DROP_TIME_COLUMN,
        ColumnType::Timestamp,
        Value::Timestamp(provenance.modified_at),
    );
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn provenance() -> Provenance {
        Provenance {
            file_id: "jan.csv".to_string(),
            loaded_at: Utc.with_ymd_and_hms(2024, 2, 1, 9, 0, 0).unwrap(),
            modified_at: Utc.with_ymd_and_hms(2024, 1, 31, 18, 30, 0).unwrap(),
        }
    }

    #[test]
    fn test_clean_column_name() {
        assert_eq!(clean_column_name(" Unit Price "), "Unit_Price");
        assert_eq!(clean_column_name("Product Type"), "Product_Type");
        assert_eq!(clean_column_name("region"), "region");
    }

    #[test]
    fn test_product_type_filled_after_rename() {
        let batch = TabularBatch::from_csv(b"Product Type,Units\nWidget,3\n,\n").unwrap();
        let out = normalize(batch, Category::Product, &provenance());

        let product_type = out.column(PRODUCT_TYPE_COLUMN).unwrap();
        assert_eq!(
            product_type.values,
            vec![Value::Text("Widget".into()), Value::Text("Unknown".into())]
        );
        assert_eq!(out.column("Units").unwrap().values[1], Value::Integer(0));
    }

    #[test]
    fn test_summary_leaves_product_type_missing() {
        let batch = TabularBatch::from_csv(b"Product_Type,Total\nWidget,3.5\n,\n").unwrap();
        let out = normalize(batch, Category::Summary, &provenance());

        assert_eq!(out.column(PRODUCT_TYPE_COLUMN).unwrap().values[1], Value::Null);
        assert_eq!(out.column("Total").unwrap().values[1], Value::Float(0.0));
    }

    #[test]
    fn test_numeric_product_type_becomes_text() {
        let batch = TabularBatch::from_csv(b"Product_Type,Units\n7,1\n,2\n").unwrap();
        let out = normalize(batch, Category::Product, &provenance());
        let column = out.column(PRODUCT_TYPE_COLUMN).unwrap();
        assert_eq!(column.kind, ColumnType::Text);
        assert_eq!(column.values[0], Value::Text("7".into()));
        assert_eq!(column.values[1], Value::Text("Unknown".into()));
    }

    #[test]
    fn test_text_nulls_untouched() {
        let batch = TabularBatch::from_csv(b"Region,Units\nnorth,2\n,1\n").unwrap();
        let out = normalize(batch, Category::Product, &provenance());
        assert_eq!(out.column("Region").unwrap().values[1], Value::Null);
    }

    #[test]
    fn test_provenance_columns_appended() {
        let batch = TabularBatch::from_csv(b"a\n1\n2\n").unwrap();
        let prov = provenance();
        let out = normalize(batch, Category::Summary, &prov);

        let names: Vec<&str> = out.column_names().collect();
        assert_eq!(names, vec!["a", SOURCE_FILE_COLUMN, LOAD_TIMESTAMP_COLUMN, FILE_DROP_TIME_COLUMN]);
        assert_eq!(out.row_count(), 2);
        assert!(out
            .column(SOURCE_FILE_COLUMN)
            .unwrap()
            .values
            .iter()
            .all(|v| *v == Value::Text("jan.csv".into())));
        assert_eq!(
            out.column(FILE_DROP_TIME_COLUMN).unwrap().values[1],
            Value::Timestamp(prov.modified_at)
        );
    }

    #[test]
    fn test_existing_provenance_column_overwritten() {
        let batch = TabularBatch::from_csv(b"a,Source_File\n1,elsewhere.csv\n").unwrap();
        let out = normalize(batch, Category::Summary, &provenance());
        assert_eq!(out.column_count(), 4);
        assert_eq!(out.column(SOURCE_FILE_COLUMN).unwrap().values[0], Value::Text("jan.csv".into()));
    }

    #[tokio::test]
    async fn test_names_colliding_after_cleanup_stay_distinct() {
        use crate::loader::{MemoryTableWriter, TableWriter};

        let batch = TabularBatch::from_csv(b"Product Type,Product_Type,a b,a_b\n,,1,2\n").unwrap();
        let out = normalize(batch, Category::Product, &provenance());

        let names: Vec<&str> = out.column_names().take(4).collect();
        assert_eq!(names, vec!["Product_Type", "Product_Type.1", "a_b", "a_b.1"]);
        assert_eq!(out.column(PRODUCT_TYPE_COLUMN).unwrap().values[0], Value::Text("Unknown".into()));
        assert_eq!(out.column("a_b").unwrap().values[0], Value::Integer(1));
        assert_eq!(out.column("a_b.1").unwrap().values[0], Value::Integer(2));

        let writer = MemoryTableWriter::new();
        writer.ensure_table("T", &out).await.unwrap();
        writer.insert_rows("T", &out, 0..1).await.unwrap();
        let stored = writer.table("T").unwrap();
        assert_eq!(stored.column_values("a_b"), vec![Value::Integer(1)]);
        assert_eq!(stored.column_values("a_b.1"), vec![Value::Integer(2)]);
        assert_eq!(stored.column_values("Product_Type"), vec![Value::Text("Unknown".into())]);
    }
}
