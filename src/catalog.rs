//! Product catalog access.
//!
//! The catalog is the storefront's database of sellable items; this service
//! only ever reads it. Each row carries a product ID and the URL of its
//! primary reference image.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{anyhow, Context, Result};
use serde_json::Value;

/// One catalog row: a product and its reference image.
#[derive(Debug, Clone)]
pub struct ProductRecord {
    pub id: i64,
    pub name: String,
    pub image_url: String,
}

pub trait CatalogStore: Send + Sync {
    /// Fetch all products with their primary image reference.
    fn fetch_products(&self) -> Result<Vec<ProductRecord>>;
}

/// Catalog backed by the storefront SQLite database.
pub struct SqliteCatalog {
    path: PathBuf,
}

impl SqliteCatalog {
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(anyhow!("catalog database not found at {:?}", path));
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    fn query_json(&self, sql: &str) -> Result<Vec<Value>> {
        let output = Command::new("sqlite3")
            .arg("-json")
            .arg(&self.path)
            .arg(sql)
            .output()
            .with_context(|| format!("running sqlite3 query against {:?}", self.path))?;

        if !output.status.success() {
            return Err(anyhow!(
                "sqlite query failed: {}",
                String::from_utf8_lossy(&output.stderr)
            ));
        }

        if output.stdout.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<Value> = serde_json::from_slice(&output.stdout).with_context(|| {
            format!(
                "parsing sqlite json output: {}",
                String::from_utf8_lossy(&output.stdout)
            )
        })?;
        Ok(rows)
    }
}

impl CatalogStore for SqliteCatalog {
    fn fetch_products(&self) -> Result<Vec<ProductRecord>> {
        let rows = self.query_json("SELECT id, name, image FROM products ORDER BY id")?;
        let products = rows
            .iter()
            .map(parse_product_row)
            .collect::<Result<Vec<_>>>()?;
        tracing::info!("Fetched {} products from catalog.", products.len());
        Ok(products)
    }
}

fn parse_product_row(row: &Value) -> Result<ProductRecord> {
    let id = row
        .get("id")
        .and_then(Value::as_i64)
        .ok_or_else(|| anyhow!("product row missing integer id: {row}"))?;
    let name = row
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    // A NULL image column yields an empty URL; acquisition fails for it and
    // the rebuild skips the row like any other bad image.
    let image_url = row
        .get("image")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Ok(ProductRecord {
        id,
        name,
        image_url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_a_full_row() {
        let row = json!({"id": 42, "name": "Canvas Tote", "image": "https://cdn.example.com/42.jpg"});
        let record = parse_product_row(&row).unwrap();
        assert_eq!(record.id, 42);
        assert_eq!(record.name, "Canvas Tote");
        assert_eq!(record.image_url, "https://cdn.example.com/42.jpg");
    }

    #[test]
    fn tolerates_null_name_and_image() {
        let row = json!({"id": 7, "name": null, "image": null});
        let record = parse_product_row(&row).unwrap();
        assert_eq!(record.id, 7);
        assert!(record.name.is_empty());
        assert!(record.image_url.is_empty());
    }

    #[test]
    fn rejects_a_row_without_id() {
        let row = json!({"name": "orphan", "image": "x"});
        assert!(parse_product_row(&row).is_err());
    }

    #[test]
    fn open_rejects_missing_database() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SqliteCatalog::open(&dir.path().join("absent.sqlite3")).is_err());
    }
}
