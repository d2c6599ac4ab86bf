// 📥 Batch Import - read change requests from CSV or JSON files
//
// CSV columns (header row required, any order, all optional):
//   id, catalog_ref (or scryfall_id / card_id), amount, tags, foil,
//   condition, signed, altered, misprint, delete
//
// Empty cells mean "not supplied". A row that cannot be parsed becomes a
// per-request error; it never fails the file.

use crate::error::RequestError;
use crate::request::{
    parse_json_batch, ChangeRequest, ParsedRequest, RawChangeRequest, RawTags, RawValue,
};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::io::Read;
use std::path::Path;

/// One CSV row, every cell as text
#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(default, alias = "_id")]
    id: Option<String>,
    #[serde(default, alias = "scryfall_id", alias = "card_id")]
    catalog_ref: Option<String>,
    #[serde(default)]
    amount: Option<String>,
    #[serde(default, alias = "tag")]
    tags: Option<String>,
    #[serde(default)]
    foil: Option<String>,
    #[serde(default)]
    condition: Option<String>,
    #[serde(default)]
    signed: Option<String>,
    #[serde(default)]
    altered: Option<String>,
    #[serde(default)]
    misprint: Option<String>,
    #[serde(default)]
    delete: Option<String>,
}

fn cell(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn text(value: Option<String>) -> Option<RawValue> {
    cell(value).map(RawValue::Text)
}

impl From<CsvRow> for RawChangeRequest {
    fn from(row: CsvRow) -> Self {
        RawChangeRequest {
            id: cell(row.id),
            catalog_ref: cell(row.catalog_ref),
            amount: text(row.amount),
            tags: cell(row.tags).map(RawTags::Text),
            foil: text(row.foil),
            condition: text(row.condition),
            signed: text(row.signed),
            altered: text(row.altered),
            misprint: text(row.misprint),
            delete: text(row.delete),
        }
    }
}

/// Parse CSV change requests from any reader
pub fn parse_csv_batch<R: Read>(reader: R) -> Result<Vec<ParsedRequest>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr.headers().context("Failed to read CSV header")?;
    if headers.is_empty() {
        bail!("CSV batch has no header row");
    }

    let mut requests = Vec::new();
    for (line, result) in rdr.deserialize::<CsvRow>().enumerate() {
        let parsed = match result {
            Ok(row) => ChangeRequest::try_from(RawChangeRequest::from(row)),
            Err(e) => Err(RequestError::parse(
                "request",
                format!("row {}: {}", line + 1, e),
            )),
        };
        requests.push(parsed);
    }

    Ok(requests)
}

/// Load a batch file, choosing the format from the extension (.json / .csv)
pub fn load_batch(path: &Path) -> Result<Vec<ParsedRequest>> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase);

    let requests = match extension.as_deref() {
        Some("json") => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read batch file: {}", path.display()))?;
            parse_json_batch(&contents)?
        }
        Some("csv") => {
            let file = std::fs::File::open(path)
                .with_context(|| format!("Failed to open batch file: {}", path.display()))?;
            parse_csv_batch(file)?
        }
        _ => bail!(
            "Unsupported batch format: {} (expected .json or .csv)",
            path.display()
        ),
    };

    tracing::debug!(path = %path.display(), requests = requests.len(), "loaded batch");
    Ok(requests)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::AmountDelta;
    use crate::entities::Condition;
    use std::io::Write;

    #[test]
    fn test_parse_csv_rows() {
        let csv = "\
scryfall_id,amount,foil,condition,tags,delete
X,+2,true,LP,\"edh, trade\",
Y,,,,,
,,,,,true
";
        let batch = parse_csv_batch(csv.as_bytes()).unwrap();
        assert_eq!(batch.len(), 3);

        let first = batch[0].as_ref().unwrap();
        assert_eq!(first.patch.catalog_ref.as_deref(), Some("X"));
        assert_eq!(first.patch.amount, Some(AmountDelta::relative(2)));
        assert_eq!(first.patch.foil, Some(true));
        assert_eq!(first.patch.condition, Some(Condition::LightlyPlayed));
        assert_eq!(first.patch.tags.as_ref().unwrap().len(), 2);

        let second = batch[1].as_ref().unwrap();
        assert_eq!(second.patch.amount, None);
        assert_eq!(second.patch.foil, None);

        let third = batch[2].as_ref().unwrap();
        assert!(third.delete);
        assert_eq!(third.patch.catalog_ref, None);
    }

    #[test]
    fn test_bad_csv_cell_only_fails_its_row() {
        let csv = "catalog_ref,amount\nX,1\nY,many\nZ,-1\n";
        let batch = parse_csv_batch(csv.as_bytes()).unwrap();

        assert!(batch[0].is_ok());
        assert!(matches!(&batch[1], Err(RequestError::Parse { field, .. }) if field == "amount"));
        assert_eq!(
            batch[2].as_ref().unwrap().patch.amount,
            Some(AmountDelta::relative(-1))
        );
    }

    #[test]
    fn test_load_batch_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let json_path = dir.path().join("batch.json");
        std::fs::write(&json_path, r#"[{"catalog_ref": "X", "amount": 3}]"#).unwrap();
        let json_batch = load_batch(&json_path).unwrap();
        assert_eq!(
            json_batch[0].as_ref().unwrap().patch.amount,
            Some(AmountDelta::absolute(3))
        );

        let csv_path = dir.path().join("batch.CSV");
        let mut file = std::fs::File::create(&csv_path).unwrap();
        writeln!(file, "id,amount").unwrap();
        writeln!(file, "abc,+1").unwrap();
        drop(file);
        let csv_batch = load_batch(&csv_path).unwrap();
        assert_eq!(csv_batch[0].as_ref().unwrap().id.as_deref(), Some("abc"));

        let txt_path = dir.path().join("batch.txt");
        std::fs::write(&txt_path, "").unwrap();
        assert!(load_batch(&txt_path).is_err());
    }
}
