//! Google Sheets v4 REST client.

use crate::cell::Grid;
use crate::config::SheetsConfig;
use crate::error::{Result, TakeoffError};
use crate::sheets::{contiguous_runs, SpreadsheetService, TabInfo, ValueRange};
use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct GoogleSheetsClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
    #[serde(default)]
    index: u32,
}

impl From<SheetProperties> for TabInfo {
    fn from(p: SheetProperties) -> Self {
        TabInfo {
            id: p.sheet_id,
            title: p.title,
            index: p.index,
        }
    }
}

#[derive(Deserialize)]
struct ValuesResponse {
    #[serde(default)]
    values: Grid,
}

#[derive(Deserialize)]
struct BatchUpdateResponse {
    #[serde(default)]
    replies: Vec<Value>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

impl GoogleSheetsClient {
    pub fn new(api_base: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.into(),
            token: token.into(),
        }
    }

    /// Build a client from config, taking the bearer token from the
    /// configured environment variable.
    pub fn from_config(cfg: &SheetsConfig) -> Result<Self> {
        let token = std::env::var(&cfg.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| TakeoffError::MissingCredentials(cfg.token_env.clone()))?;
        Ok(Self::new(cfg.api_base.clone(), token))
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(self.api_base.trim_end_matches('/'))
            .map_err(|e| TakeoffError::Invalid(format!("bad sheets api base: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| TakeoffError::Invalid(format!("bad sheets api base: {}", self.api_base)))?
            .pop_if_empty()
            .push("spreadsheets")
            .extend(segments);
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> Result<T> {
        let resp = req.bearer_auth(&self.token).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TakeoffError::Upstream(format!("{status}: {}", body.trim())));
        }
        Ok(resp.json::<T>().await?)
    }

    async fn read_values(&self, spreadsheet_id: &str, range: &str, render: &str) -> Result<Grid> {
        let mut url = self.url(&[spreadsheet_id, "values", range])?;
        url.query_pairs_mut()
            .append_pair("valueRenderOption", render)
            .append_pair("majorDimension", "ROWS");
        debug!(spreadsheet_id, range, render, "reading range");
        let resp: ValuesResponse = self.send(self.http.get(url)).await?;
        Ok(resp.values)
    }

    async fn batch_update(&self, spreadsheet_id: &str, requests: Vec<Value>) -> Result<Vec<Value>> {
        let target = format!("{spreadsheet_id}:batchUpdate");
        let url = self.url(&[target.as_str()])?;
        let resp: BatchUpdateResponse = self
            .send(self.http.post(url).json(&json!({ "requests": requests })))
            .await?;
        Ok(resp.replies)
    }

    async fn hide_dimension(
        &self,
        spreadsheet_id: &str,
        tab_id: i64,
        dimension: &str,
        zero_based: Vec<usize>,
    ) -> Result<()> {
        let requests: Vec<Value> = contiguous_runs(zero_based)
            .into_iter()
            .map(|(start, end)| {
                json!({
                    "updateDimensionProperties": {
                        "range": {
                            "sheetId": tab_id,
                            "dimension": dimension,
                            "startIndex": start,
                            "endIndex": end,
                        },
                        "properties": { "hiddenByUser": true },
                        "fields": "hiddenByUser",
                    }
                })
            })
            .collect();
        if requests.is_empty() {
            return Ok(());
        }
        self.batch_update(spreadsheet_id, requests).await?;
        Ok(())
    }
}

#[async_trait]
impl SpreadsheetService for GoogleSheetsClient {
    async fn list_tabs(&self, spreadsheet_id: &str) -> Result<Vec<TabInfo>> {
        let mut url = self.url(&[spreadsheet_id])?;
        url.query_pairs_mut().append_pair("fields", "sheets.properties");
        let meta: SpreadsheetMeta = self.send(self.http.get(url)).await?;
        Ok(meta.sheets.into_iter().map(|s| s.properties.into()).collect())
    }

    async fn read_range(&self, spreadsheet_id: &str, range: &str) -> Result<Grid> {
        self.read_values(spreadsheet_id, range, "UNFORMATTED_VALUE").await
    }

    async fn read_formulas(&self, spreadsheet_id: &str, range: &str) -> Result<Grid> {
        self.read_values(spreadsheet_id, range, "FORMULA").await
    }

    async fn duplicate_tab(&self, spreadsheet_id: &str, source_tab_id: i64) -> Result<TabInfo> {
        let replies = self
            .batch_update(
                spreadsheet_id,
                vec![json!({ "duplicateSheet": { "sourceSheetId": source_tab_id } })],
            )
            .await?;
        let props = replies
            .into_iter()
            .next()
            .and_then(|r| r.get("duplicateSheet").and_then(|d| d.get("properties")).cloned())
            .ok_or_else(|| {
                TakeoffError::Upstream("duplicateSheet reply carried no sheet properties".into())
            })?;
        let props: SheetProperties = serde_json::from_value(props)?;
        Ok(props.into())
    }

    async fn rename_tab(&self, spreadsheet_id: &str, tab_id: i64, title: &str) -> Result<()> {
        self.batch_update(
            spreadsheet_id,
            vec![json!({
                "updateSheetProperties": {
                    "properties": { "sheetId": tab_id, "title": title },
                    "fields": "title",
                }
            })],
        )
        .await?;
        Ok(())
    }

    async fn write_ranges(&self, spreadsheet_id: &str, data: &[ValueRange]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let url = self.url(&[spreadsheet_id, "values:batchUpdate"])?;
        let body = json!({ "valueInputOption": "USER_ENTERED", "data": data });
        let _: Value = self.send(self.http.post(url).json(&body)).await?;
        Ok(())
    }

    async fn hide_rows(&self, spreadsheet_id: &str, tab_id: i64, rows: &[u32]) -> Result<()> {
        let zero_based = rows
            .iter()
            .filter(|r| **r > 0)
            .map(|r| (*r - 1) as usize)
            .collect();
        self.hide_dimension(spreadsheet_id, tab_id, "ROWS", zero_based).await
    }

    async fn hide_columns(
        &self,
        spreadsheet_id: &str,
        tab_id: i64,
        columns: &[usize],
    ) -> Result<()> {
        self.hide_dimension(spreadsheet_id, tab_id, "COLUMNS", columns.to_vec())
            .await
    }

    async fn delete_tab(&self, spreadsheet_id: &str, tab_id: i64) -> Result<()> {
        self.batch_update(
            spreadsheet_id,
            vec![json!({ "deleteSheet": { "sheetId": tab_id } })],
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellValue;
    use axum::{
        extract::State,
        http::{HeaderMap, Method, StatusCode, Uri},
        response::{IntoResponse, Response},
        Json, Router,
    };
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone)]
    struct Seen {
        method: Method,
        path: String,
        query: String,
        auth: String,
        body: String,
    }

    type Log = Arc<Mutex<Vec<Seen>>>;

    async fn fake_sheets(
        State(log): State<Log>,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: String,
    ) -> Response {
        let path = uri.path().to_string();
        log.lock().unwrap().push(Seen {
            method,
            path: path.clone(),
            query: uri.query().unwrap_or("").to_string(),
            auth: headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string(),
            body: body.clone(),
        });

        if path.contains("/missing") {
            return (StatusCode::NOT_FOUND, "Requested entity was not found.").into_response();
        }
        if path.ends_with("values:batchUpdate") {
            return Json(json!({ "totalUpdatedCells": 3 })).into_response();
        }
        if path.ends_with(":batchUpdate") {
            if body.contains("duplicateSheet") {
                return Json(json!({
                    "replies": [{ "duplicateSheet": { "properties": {
                        "sheetId": 99, "title": "Copy of DATE", "index": 2
                    }}}]
                }))
                .into_response();
            }
            return Json(json!({ "replies": [{}] })).into_response();
        }
        if path.contains("/values/") {
            return Json(json!({
                "range": "Setup!A1:C2",
                "values": [["MR-001", 4.5, true], ["", "=SUM(G4:M4)"]]
            }))
            .into_response();
        }
        Json(json!({
            "sheets": [
                { "properties": { "sheetId": 0, "title": "Setup", "index": 0 } },
                { "properties": { "sheetId": 7, "title": "DATE", "index": 1 } }
            ]
        }))
        .into_response()
    }

    async fn stub() -> (GoogleSheetsClient, Log) {
        let log: Log = Arc::default();
        let app = Router::new().fallback(fake_sheets).with_state(log.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (GoogleSheetsClient::new(format!("http://{addr}/v4"), "tok"), log)
    }

    #[tokio::test]
    async fn lists_tabs_with_bearer_token() {
        let (client, log) = stub().await;
        let tabs = client.list_tabs("abc").await.unwrap();
        assert_eq!(tabs.len(), 2);
        assert_eq!((tabs[1].id, tabs[1].title.as_str()), (7, "DATE"));

        let seen = log.lock().unwrap()[0].clone();
        assert_eq!(seen.path, "/v4/spreadsheets/abc");
        assert_eq!(seen.auth, "Bearer tok");
        assert!(seen.query.contains("fields=sheets.properties"));
    }

    #[tokio::test]
    async fn reads_unformatted_and_formula_values() {
        let (client, log) = stub().await;
        let grid = client.read_range("abc", "'Setup'!A1:R70").await.unwrap();
        assert_eq!(grid[0][1], CellValue::Number(4.5));
        assert_eq!(grid[0][2], CellValue::Bool(true));

        let formulas = client.read_formulas("abc", "'v1'!O4:O10").await.unwrap();
        assert!(formulas[1][1].is_formula());

        let log = log.lock().unwrap();
        assert!(log[0].path.contains("/values/"));
        assert!(log[0].path.ends_with("A1:R70"));
        assert!(log[0].query.contains("valueRenderOption=UNFORMATTED_VALUE"));
        assert!(log[1].query.contains("valueRenderOption=FORMULA"));
    }

    #[tokio::test]
    async fn duplicate_returns_new_tab() {
        let (client, log) = stub().await;
        let tab = client.duplicate_tab("abc", 7).await.unwrap();
        assert_eq!(tab.id, 99);
        let seen = log.lock().unwrap()[0].clone();
        assert_eq!(seen.method, Method::POST);
        assert_eq!(seen.path, "/v4/spreadsheets/abc:batchUpdate");
        assert!(seen.body.contains("\"sourceSheetId\":7"));
    }

    #[tokio::test]
    async fn hides_rows_in_contiguous_runs() {
        let (client, log) = stub().await;
        client.hide_rows("abc", 99, &[5, 6, 7, 10]).await.unwrap();
        client.hide_columns("abc", 99, &[]).await.unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 1);
        let body: Value = serde_json::from_str(&log[0].body).unwrap();
        let requests = body["requests"].as_array().unwrap();
        assert_eq!(requests.len(), 2);
        let range = &requests[0]["updateDimensionProperties"]["range"];
        assert_eq!(range["startIndex"], 4);
        assert_eq!(range["endIndex"], 7);
        assert_eq!(range["dimension"], "ROWS");
    }

    #[tokio::test]
    async fn writes_values_user_entered() {
        let (client, log) = stub().await;
        let data = vec![ValueRange::cell("'v1'!A2", CellValue::text("Smith Residence"))];
        client.write_ranges("abc", &data).await.unwrap();
        let seen = log.lock().unwrap()[0].clone();
        assert_eq!(seen.path, "/v4/spreadsheets/abc/values:batchUpdate");
        let body: Value = serde_json::from_str(&seen.body).unwrap();
        assert_eq!(body["valueInputOption"], "USER_ENTERED");
        assert_eq!(body["data"][0]["values"][0][0], "Smith Residence");
    }

    #[tokio::test]
    async fn http_errors_become_upstream() {
        let (client, _log) = stub().await;
        let err = client.list_tabs("missing").await.unwrap_err();
        assert!(matches!(err, TakeoffError::Upstream(ref m) if m.starts_with("404")));
    }

    #[test]
    fn missing_token_is_reported() {
        let cfg = SheetsConfig {
            api_base: "http://localhost".into(),
            token_env: "TAKEOFF_TEST_TOKEN_THAT_IS_NEVER_SET".into(),
        };
        assert!(matches!(
            GoogleSheetsClient::from_config(&cfg),
            Err(TakeoffError::MissingCredentials(_))
        ));
    }
}
