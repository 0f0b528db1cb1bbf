// src/store/sheets.rs
// Google Sheets v4 values API over blocking reqwest. One request per call;
// retries belong to the gateway.

use std::time::Duration;

use reqwest::{
    blocking::{Client, RequestBuilder, Response},
    StatusCode, Url,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::{
    config::consts::SHEETS_API,
    core::net::retry_after,
    error::BackendError,
    record::RowPosition,
};

use super::TableBackend;

pub struct SheetsTable {
    client: Client,
    api_base: String,
    spreadsheet_id: String,
    worksheet: String,
    token: String,
    width: usize,
}

impl SheetsTable {
    /// `width` is the number of schema columns; ranges span `A..=<width>`.
    pub fn new(
        client: Client,
        spreadsheet_id: impl Into<String>,
        worksheet: impl Into<String>,
        token: impl Into<String>,
        width: usize,
    ) -> Self {
        Self {
            client,
            api_base: s!(SHEETS_API),
            spreadsheet_id: spreadsheet_id.into(),
            worksheet: worksheet.into(),
            token: token.into(),
            width: width.max(1),
        }
    }

    /// Point at another host (emulator, proxy).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    fn last_col(&self) -> String {
        column_letter(self.width)
    }

    /// `{base}/{id}/{segment}`, segment percent-encoded as one path piece.
    fn url(&self, segment: Option<&str>) -> Result<Url, BackendError> {
        let mut url = Url::parse(&format!("{}/", self.api_base))
            .map_err(|e| BackendError::Rejected(format!("bad api base '{}': {e}", self.api_base)))?;
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| BackendError::Rejected(format!("api base '{}' cannot take a path", self.api_base)))?;
            path.pop_if_empty().push(&self.spreadsheet_id);
            if let Some(seg) = segment {
                path.push(seg);
            }
        }
        Ok(url)
    }

    fn values_url(&self, range: &str, action: &str) -> Result<Url, BackendError> {
        let mut url = self.url(Some("values"))?;
        if let Ok(mut path) = url.path_segments_mut() {
            path.push(&join!(range, action));
        }
        Ok(url)
    }

    fn send(&self, req: RequestBuilder) -> Result<Response, BackendError> {
        let resp = req.bearer_auth(&self.token).send().map_err(transport)?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let hint = retry_after(&resp);
        let body = resp.text().unwrap_or_default();
        Err(classify(status, hint, &body))
    }
}

fn transport(e: reqwest::Error) -> BackendError {
    BackendError::Transient(e.to_string())
}

fn bad_body(e: reqwest::Error) -> BackendError {
    BackendError::Rejected(format!("unexpected response body: {e}"))
}

/// Map an HTTP failure onto the gateway's retry classes.
pub(crate) fn classify(status: StatusCode, retry_after: Option<Duration>, body: &str) -> BackendError {
    let snippet: String = body.chars().take(200).collect();
    match status.as_u16() {
        429 => BackendError::RateLimited { retry_after },
        // Per-user quota errors come back as 403 with a rate-limit reason.
        403 if body.contains("rateLimitExceeded") || body.contains("RATE_LIMIT_EXCEEDED") => {
            BackendError::RateLimited { retry_after }
        }
        401 | 403 => BackendError::Auth(format!("HTTP {status}: {snippet}")),
        408 | 500..=599 => BackendError::Transient(format!("HTTP {status}: {snippet}")),
        _ => BackendError::Rejected(format!("HTTP {status}: {snippet}")),
    }
}

/* ---------------- A1 notation ---------------- */

/// 1 → A, 26 → Z, 27 → AA.
pub fn column_letter(mut n: usize) -> String {
    let mut out = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        out.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// Tab name quoted for a range; embedded quotes doubled.
pub fn quote_tab(name: &str) -> String {
    format!("'{}'", name.replace('\'', "''"))
}

/// First row number of an `updatedRange` such as `'Agreements'!A5:I7`.
pub fn start_row(range: &str) -> Option<u32> {
    let cells = range.rsplit('!').next()?;
    let first = cells.split(':').next()?;
    first.trim_start_matches(|c: char| c.is_ascii_alphabetic()).parse().ok()
}

fn cell_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(true) => s!("TRUE"),
        Value::Bool(false) => s!("FALSE"),
        Value::Null => s!(),
        other => other.to_string(),
    }
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendResponse {
    updates: Option<AppendUpdates>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendUpdates {
    updated_range: Option<String>,
}

#[derive(Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Deserialize)]
struct SheetMeta {
    properties: SheetProperties,
}

#[derive(Deserialize)]
struct SheetProperties {
    title: String,
}

impl TableBackend for SheetsTable {
    fn describe(&self) -> String {
        format!("sheet {} / {}", self.spreadsheet_id, self.worksheet)
    }

    fn ensure_table(&mut self) -> Result<(), BackendError> {
        let mut url = self.url(None)?;
        url.query_pairs_mut().append_pair("fields", "sheets.properties.title");
        let meta: SpreadsheetMeta = self.send(self.client.get(url))?.json().map_err(bad_body)?;
        if meta.sheets.iter().any(|s| s.properties.title == self.worksheet) {
            return Ok(());
        }

        debug!(tab = %self.worksheet, "creating missing tab");
        let mut url = self.url(None)?;
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop();
            path.push(&join!(&self.spreadsheet_id, ":batchUpdate"));
        }
        let body = json!({ "requests": [{ "addSheet": { "properties": { "title": self.worksheet } } }] });
        match self.send(self.client.post(url).json(&body)) {
            Ok(_) => Ok(()),
            // Someone else created it between the listing and the add.
            Err(BackendError::Rejected(msg)) if msg.contains("already exists") => {
                debug!(tab = %self.worksheet, "tab appeared concurrently");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn read_all(&mut self) -> Result<Vec<Vec<String>>, BackendError> {
        let range = format!("{}!A:{}", quote_tab(&self.worksheet), self.last_col());
        let mut url = self.values_url(&range, "")?;
        url.query_pairs_mut().append_pair("majorDimension", "ROWS");
        match self.send(self.client.get(url)) {
            Ok(resp) => {
                let vr: ValueRange = resp.json().map_err(bad_body)?;
                Ok(vr.values.iter().map(|r| r.iter().map(cell_string).collect()).collect())
            }
            // Tab not created yet.
            Err(BackendError::Rejected(msg)) if msg.contains("Unable to parse range") => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    fn write_header(&mut self, header: &[String]) -> Result<(), BackendError> {
        let range = format!("{}!A1:{}1", quote_tab(&self.worksheet), self.last_col());
        let mut url = self.values_url(&range, "")?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");
        let body = json!({ "range": range, "majorDimension": "ROWS", "values": [header] });
        self.send(self.client.put(url).json(&body))?;
        Ok(())
    }

    fn append_rows(&mut self, rows: &[Vec<String>]) -> Result<RowPosition, BackendError> {
        let range = format!("{}!A1:{}", quote_tab(&self.worksheet), self.last_col());
        let mut url = self.values_url(&range, ":append")?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");
        let body = json!({ "majorDimension": "ROWS", "values": rows });
        let resp: AppendResponse = self.send(self.client.post(url).json(&body))?.json().map_err(bad_body)?;
        resp.updates
            .and_then(|u| u.updated_range)
            .as_deref()
            .and_then(start_row)
            .map(RowPosition::new)
            .ok_or_else(|| BackendError::Rejected(s!("append response carried no updatedRange")))
    }

    fn update_rows(&mut self, rows: &[(RowPosition, Vec<String>)]) -> Result<(), BackendError> {
        let tab = quote_tab(&self.worksheet);
        let last = self.last_col();
        let data: Vec<Value> = rows
            .iter()
            .map(|(pos, cells)| {
                let n = pos.get();
                json!({ "range": format!("{tab}!A{n}:{last}{n}"), "majorDimension": "ROWS", "values": [cells] })
            })
            .collect();
        let url = self.url(Some("values:batchUpdate"))?;
        let body = json!({ "valueInputOption": "RAW", "data": data });
        self.send(self.client.post(url).json(&body))?;
        Ok(())
    }
}
