//! Lead table loading from uploaded files (Polars / calamine) and remote lists

use crate::error::PipelineError;
use crate::table::{Column, ColumnData, Table};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::NaiveDateTime;
use polars::prelude::*;
use reqwest::header::ACCEPT;
use serde_json::Value;
use std::io::Cursor;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Source of a lead table
///
/// Every loader produces the same [`Table`] contract; nothing downstream
/// depends on where the rows came from.
pub trait Loader {
    /// Short description used in logs
    fn describe(&self) -> String;

    /// Read the source into a table
    fn load(&self) -> Result<Table, PipelineError>;
}

/// File content read from disk or received as an upload
#[derive(Debug, Clone)]
pub struct FileLoader {
    filename: String,
    bytes: Vec<u8>,
}

impl FileLoader {
    /// Wrap uploaded content together with its original filename
    pub fn from_bytes(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }

    /// Read a file from disk
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| PipelineError::load(format!("cannot read {}: {}", path.display(), e)))?;
        Ok(Self::from_bytes(path.to_string_lossy(), bytes))
    }

    fn is_csv(&self) -> bool {
        Path::new(&self.filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
    }
}

impl Loader for FileLoader {
    fn describe(&self) -> String {
        format!("file {}", self.filename)
    }

    fn load(&self) -> Result<Table, PipelineError> {
        if self.filename.is_empty() {
            return Err(PipelineError::load("no file uploaded"));
        }

        // Anything that is not CSV goes through the spreadsheet reader
        let table = if self.is_csv() {
            read_csv(&self.bytes)?
        } else {
            read_spreadsheet(&self.bytes)?
        };

        info!(
            "Loaded {} rows x {} columns from {}",
            table.height(),
            table.width(),
            self.filename
        );
        Ok(table)
    }
}

/// Parse CSV content with Polars and convert it into a table
pub fn read_csv(bytes: &[u8]) -> Result<Table, PipelineError> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(100))
        .into_reader_with_file_handle(Cursor::new(bytes.to_vec()))
        .finish()?;

    table_from_dataframe(&df)
}

/// Numeric and boolean columns become numeric, everything else text
fn table_from_dataframe(df: &DataFrame) -> Result<Table, PipelineError> {
    let mut columns = Vec::with_capacity(df.width());

    for series in df.get_columns() {
        let name = series.name().to_string();
        let dtype = series.dtype();

        let data = if dtype.is_numeric() || *dtype == DataType::Boolean {
            let values = series.cast(&DataType::Float64)?;
            ColumnData::Numeric(values.f64()?.into_iter().collect())
        } else {
            let values = series.cast(&DataType::String)?;
            ColumnData::Text(
                values
                    .str()?
                    .into_iter()
                    .map(|v| v.map(str::to_owned))
                    .collect(),
            )
        };

        debug!("Column '{}' ({}) -> {}", name, dtype, kind_name(&data));
        columns.push(Column::new(name, data));
    }

    Table::from_columns(columns)
}

/// Read the first sheet of a workbook; the first row is the header
pub fn read_spreadsheet(bytes: &[u8]) -> Result<Table, PipelineError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| PipelineError::load("workbook has no sheets"))??;

    let mut rows = range.rows();
    let header: Vec<String> = match rows.next() {
        Some(header) => header.iter().map(|cell| cell.to_string()).collect(),
        None => return Ok(Table::default()),
    };
    let body: Vec<&[Data]> = rows.collect();

    let columns = header
        .into_iter()
        .enumerate()
        .map(|(idx, name)| {
            let cells = body
                .iter()
                .map(|row| row.get(idx).map(spreadsheet_cell).unwrap_or(Cell::Empty))
                .collect();
            Column::new(name, infer_column(cells))
        })
        .collect();

    Table::from_columns(columns)
}

/// A single untyped value before column type inference
#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Empty,
    Number(f64),
    Date(NaiveDateTime),
    Text(String),
}

impl Cell {
    fn into_text(self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Number(n) => Some(n.to_string()),
            Cell::Date(d) => Some(d.to_string()),
            Cell::Text(s) => Some(s),
        }
    }
}

fn spreadsheet_cell(cell: &Data) -> Cell {
    match cell {
        Data::Empty => Cell::Empty,
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::Bool(b) => Cell::Number(if *b { 1.0 } else { 0.0 }),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(Cell::Date)
            .unwrap_or_else(|| Cell::Text(cell.to_string())),
        Data::String(s) if s.trim().is_empty() => Cell::Empty,
        other => Cell::Text(other.to_string()),
    }
}

fn json_cell(value: Value) -> Cell {
    match value {
        Value::Null => Cell::Empty,
        Value::Bool(b) => Cell::Number(if b { 1.0 } else { 0.0 }),
        Value::Number(n) => n.as_f64().map(Cell::Number).unwrap_or(Cell::Empty),
        Value::String(s) => Cell::Text(s),
        other => Cell::Text(other.to_string()),
    }
}

/// Numeric when every present cell is a number, date when every present
/// cell is a date, text otherwise
fn infer_column(cells: Vec<Cell>) -> ColumnData {
    let all_numeric = cells
        .iter()
        .all(|c| matches!(c, Cell::Empty | Cell::Number(_)));
    let all_dates = cells
        .iter()
        .all(|c| matches!(c, Cell::Empty | Cell::Date(_)));

    if all_numeric {
        ColumnData::Numeric(
            cells
                .into_iter()
                .map(|c| match c {
                    Cell::Number(n) => Some(n),
                    _ => None,
                })
                .collect(),
        )
    } else if all_dates {
        ColumnData::Date(
            cells
                .into_iter()
                .map(|c| match c {
                    Cell::Date(d) => Some(d),
                    _ => None,
                })
                .collect(),
        )
    } else {
        ColumnData::Text(cells.into_iter().map(Cell::into_text).collect())
    }
}

/// Items of a SharePoint-style list fetched over its REST API
#[derive(Debug, Clone)]
pub struct RemoteListLoader {
    site_url: String,
    list_title: String,
    client_id: String,
    client_secret: String,
    timeout: Duration,
}

impl RemoteListLoader {
    pub fn new(
        site_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            site_url: site_url.into(),
            list_title: "Leads".to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_list_title(mut self, title: impl Into<String>) -> Self {
        self.list_title = title.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// REST endpoint listing the items of the configured list
    pub fn items_url(&self) -> String {
        format!(
            "{}/_api/web/lists/GetByTitle('{}')/items",
            self.site_url.trim_end_matches('/'),
            self.list_title.replace('\'', "''")
        )
    }
}

impl Loader for RemoteListLoader {
    fn describe(&self) -> String {
        format!("list '{}' at {}", self.list_title, self.site_url)
    }

    fn load(&self) -> Result<Table, PipelineError> {
        if self.site_url.is_empty() {
            return Err(PipelineError::load("no list URL provided"));
        }

        let url = self.items_url();
        debug!("Fetching list items from {}", url);

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()?;
        let payload: Value = client
            .get(&url)
            .header(ACCEPT, "application/json;odata=nometadata")
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .send()?
            .error_for_status()?
            .json()?;

        let table = table_from_list_payload(payload)?;
        info!(
            "Loaded {} rows x {} columns from {}",
            table.height(),
            table.width(),
            self.describe()
        );
        Ok(table)
    }
}

/// Accepts `{"value": [...]}`, `{"d": {"results": [...]}}` or a bare array
pub fn table_from_list_payload(payload: Value) -> Result<Table, PipelineError> {
    let items = match payload {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("value") {
            Some(Value::Array(items)) => items,
            _ => match obj.remove("d") {
                Some(Value::Object(mut d)) => match d.remove("results") {
                    Some(Value::Array(items)) => items,
                    _ => return Err(PipelineError::load("list payload has no results")),
                },
                _ => return Err(PipelineError::load("list payload has no items")),
            },
        },
        _ => return Err(PipelineError::load("list payload is not a JSON object")),
    };

    let records = items
        .into_iter()
        .map(|item| match item {
            Value::Object(fields) => Ok(fields),
            _ => Err(PipelineError::load("list item is not a JSON object")),
        })
        .collect::<Result<Vec<_>, _>>()?;

    table_from_records(records)
}

/// One row per record; columns are the union of keys in first-seen order
pub fn table_from_records(
    records: Vec<serde_json::Map<String, Value>>,
) -> Result<Table, PipelineError> {
    let mut names: Vec<String> = Vec::new();
    for record in &records {
        for key in record.keys() {
            if !names.contains(key) {
                names.push(key.clone());
            }
        }
    }

    let mut cells: Vec<Vec<Cell>> = vec![Vec::with_capacity(records.len()); names.len()];
    for mut record in records {
        for (idx, name) in names.iter().enumerate() {
            let cell = record.remove(name).map(json_cell).unwrap_or(Cell::Empty);
            cells[idx].push(cell);
        }
    }

    let columns = names
        .into_iter()
        .zip(cells)
        .map(|(name, cells)| Column::new(name, infer_column(cells)))
        .collect();

    Table::from_columns(columns)
}

fn kind_name(data: &ColumnData) -> &'static str {
    match data {
        ColumnData::Numeric(_) => "numeric",
        ColumnData::Text(_) => "text",
        ColumnData::Date(_) => "date",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_csv() -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "Lead,Estimated Revenue,Converted,Lead Date").unwrap();
        writeln!(file, "Acme,100.0,1,2024-01-01").unwrap();
        writeln!(file, "Globex,,0,2024-01-05").unwrap();
        writeln!(file, "Initech,300.0,1,2024-01-09").unwrap();
        file
    }

    #[test]
    fn test_load_csv_file() {
        let test_file = create_test_csv();
        let table = FileLoader::open(test_file.path()).unwrap().load().unwrap();

        assert_eq!(table.height(), 3);
        assert_eq!(
            table.column_names(),
            vec!["Lead", "Estimated Revenue", "Converted", "Lead Date"]
        );
        assert_eq!(
            table.numeric("Estimated Revenue").unwrap(),
            &[Some(100.0), None, Some(300.0)]
        );
        assert_eq!(
            table.numeric("Converted").unwrap(),
            &[Some(1.0), Some(0.0), Some(1.0)]
        );
        assert!(matches!(
            table.column("Lead Date").unwrap().data,
            ColumnData::Text(_)
        ));
    }

    #[test]
    fn test_boolean_csv_column_is_numeric() {
        let csv = b"Converted\ntrue\nfalse\ntrue\n";
        let table = read_csv(csv).unwrap();
        assert_eq!(
            table.numeric("Converted").unwrap(),
            &[Some(1.0), Some(0.0), Some(1.0)]
        );
    }

    #[test]
    fn test_header_only_csv_has_no_rows() {
        let loader = FileLoader::from_bytes("leads.csv", b"Estimated Revenue,Converted\n".to_vec());
        let table = loader.load().unwrap();
        assert_eq!(table.height(), 0);
    }

    #[test]
    fn test_missing_filename_is_load_error() {
        let loader = FileLoader::from_bytes("", b"a\n1\n".to_vec());
        assert!(matches!(loader.load(), Err(PipelineError::Load(_))));
    }

    #[test]
    fn test_garbage_spreadsheet_is_load_error() {
        let loader = FileLoader::from_bytes("leads.xlsx", b"not a workbook".to_vec());
        assert!(matches!(loader.load(), Err(PipelineError::Load(_))));
    }

    #[test]
    fn test_table_from_list_payload() {
        let payload = json!({
            "value": [
                {"Title": "Acme", "Estimated Revenue": 100, "Converted": true},
                {"Title": "Globex", "Estimated Revenue": null, "Lead Date": "2024-02-01"},
            ]
        });
        let table = table_from_list_payload(payload).unwrap();

        assert_eq!(table.height(), 2);
        assert_eq!(
            table.column_names(),
            vec!["Title", "Estimated Revenue", "Converted", "Lead Date"]
        );
        assert_eq!(
            table.numeric("Estimated Revenue").unwrap(),
            &[Some(100.0), None]
        );
        assert_eq!(table.numeric("Converted").unwrap(), &[Some(1.0), None]);
        match &table.column("Lead Date").unwrap().data {
            ColumnData::Text(v) => assert_eq!(v, &vec![None, Some("2024-02-01".to_string())]),
            other => panic!("unexpected column type: {:?}", other),
        }
    }

    #[test]
    fn test_verbose_odata_payload() {
        let payload = json!({"d": {"results": [{"Estimated Revenue": 5.5}]}});
        let table = table_from_list_payload(payload).unwrap();
        assert_eq!(table.complete_numeric("Estimated Revenue"), Some(vec![5.5]));
    }

    #[test]
    fn test_mixed_column_falls_back_to_text() {
        let payload = json!([{"x": 1}, {"x": "two"}]);
        let table = table_from_list_payload(payload).unwrap();
        match &table.column("x").unwrap().data {
            ColumnData::Text(v) => {
                assert_eq!(v, &vec![Some("1".to_string()), Some("two".to_string())])
            }
            other => panic!("unexpected column type: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_payload() {
        assert!(table_from_list_payload(json!("nope")).is_err());
        assert!(table_from_list_payload(json!({"value": [1, 2]})).is_err());
    }

    #[test]
    fn test_items_url() {
        let loader = RemoteListLoader::new("https://contoso.sharepoint.com/sites/sales/", "id", "secret");
        assert_eq!(
            loader.items_url(),
            "https://contoso.sharepoint.com/sites/sales/_api/web/lists/GetByTitle('Leads')/items"
        );
    }

    #[test]
    fn test_record_columns_keep_first_seen_order() {
        let payload = json!([
            {"Zeta": 1, "Alpha": 2, "Mid": 3},
            {"Beta": 4, "Alpha": 5},
        ]);
        let table = table_from_list_payload(payload).unwrap();
        assert_eq!(table.column_names(), vec!["Zeta", "Alpha", "Mid", "Beta"]);
    }

    fn items_path() -> Matcher {
        Matcher::Regex(r"^/_api/web/lists/GetByTitle\('Leads'\)/items$".to_string())
    }

    #[test]
    fn test_remote_list_load() {
        let mut server = Server::new();
        let mock = server
            .mock("GET", items_path())
            .match_header("accept", "application/json;odata=nometadata")
            // base64("id:secret")
            .match_header("authorization", "Basic aWQ6c2VjcmV0")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"value": [
                    {"Title": "Acme", "Estimated Revenue": 100, "Lead Date": "2024-01-01"},
                    {"Title": "Globex", "Estimated Revenue": 250.5, "Lead Date": "2024-01-03"}
                ]}"#,
            )
            .create();

        let loader = RemoteListLoader::new(server.url(), "id", "secret");
        let table = loader.load().unwrap();

        mock.assert();
        assert_eq!(table.height(), 2);
        assert_eq!(
            table.column_names(),
            vec!["Title", "Estimated Revenue", "Lead Date"]
        );
        assert_eq!(
            table.complete_numeric("Estimated Revenue"),
            Some(vec![100.0, 250.5])
        );
    }

    #[test]
    fn test_remote_list_unauthorized_is_load_error() {
        let mut server = Server::new();
        let mock = server
            .mock("GET", items_path())
            .with_status(401)
            .with_body("Access denied")
            .create();

        let loader = RemoteListLoader::new(server.url(), "id", "wrong");
        let result = loader.load();

        mock.assert();
        assert!(matches!(result, Err(PipelineError::Load(_))));
    }

    #[test]
    fn test_remote_list_malformed_body_is_load_error() {
        let mut server = Server::new();
        let _mock = server
            .mock("GET", items_path())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("<html>not json</html>")
            .create();

        let loader = RemoteListLoader::new(server.url(), "id", "secret");
        assert!(matches!(loader.load(), Err(PipelineError::Load(_))));
    }
}
