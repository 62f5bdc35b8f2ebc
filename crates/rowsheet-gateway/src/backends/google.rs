//! Sheets API v4 over blocking HTTPS.
//!
//! The wire types below mirror just the subset of the REST resources the
//! gateway uses. Cell values are requested formatted, so every cell arrives
//! as a string; anything else is stringified defensively.

use reqwest::Url;
use reqwest::blocking::{Client, RequestBuilder};
use rowsheet_common::{RemoteError, RowSpan, Sheet};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::traits::{
    AppendOutcome, DataFilter, DeveloperMetadata, DocumentGateway, Grid, GridRange,
    MetadataLookup, MutationReply, StructuralRequest, ValueRange,
};

pub const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com/v4";

const USER_AGENT: &str = concat!("rowsheet/", env!("CARGO_PKG_VERSION"));

/// Google Sheets backend authorized with one OAuth access token.
#[derive(Clone)]
pub struct GoogleSheets {
    client: Client,
    access_token: String,
    base_url: String,
}

impl GoogleSheets {
    pub fn new(access_token: impl Into<String>) -> Result<Self, RemoteError> {
        Self::with_base_url(access_token, DEFAULT_BASE_URL)
    }

    /// Point the backend at another endpoint (a proxy or an emulator).
    pub fn with_base_url(
        access_token: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| RemoteError::transport(e.to_string()))?;
        Ok(Self {
            client,
            access_token: access_token.into(),
            base_url: base_url.into(),
        })
    }

    /// `{base}/spreadsheets/{doc}/{segments...}`, each segment percent-encoded.
    fn url(&self, doc: &str, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| RemoteError::transport(format!("bad base url {}: {e}", self.base_url)))?;
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                RemoteError::transport(format!("base url {} cannot be a base", self.base_url))
            })?;
            path.pop_if_empty().push("spreadsheets");
            match segments.split_first() {
                // Custom methods on the spreadsheet itself: `{doc}:batchUpdate`.
                Some((first, rest)) if first.starts_with(':') => {
                    path.push(&format!("{doc}{first}"));
                    path.extend(rest);
                }
                _ => {
                    path.push(doc);
                    path.extend(segments);
                }
            }
        }
        Ok(url)
    }

    fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, RemoteError> {
        let response = request
            .bearer_auth(&self.access_token)
            .send()
            .map_err(|e| RemoteError::transport(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .map_err(|e| RemoteError::transport(e.to_string()))?;
        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or(body);
            let err = RemoteError::new(status.as_u16(), message);
            #[cfg(feature = "tracing")]
            tracing::warn!(status = status.as_u16(), message = %err.message, "sheets api error");
            return Err(err);
        }
        if body.trim().is_empty() {
            return serde_json::from_str("{}")
                .map_err(|e| RemoteError::transport(format!("unexpected empty response: {e}")));
        }
        serde_json::from_str(&body)
            .map_err(|e| RemoteError::transport(format!("malformed response: {e}")))
    }
}

/* ─────────────────────────── wire types ─────────────────────────── */

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Deserialize, Default)]
struct SpreadsheetWire {
    #[serde(default)]
    sheets: Vec<SheetWire>,
}

#[derive(Deserialize)]
struct SheetWire {
    properties: SheetPropertiesWire,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetPropertiesWire {
    #[serde(default)]
    sheet_id: i64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    index: i64,
}

#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ValueRangeWire {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    range: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    major_dimension: Option<String>,
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

impl From<ValueRangeWire> for ValueRange {
    fn from(wire: ValueRangeWire) -> Self {
        ValueRange {
            range: wire.range,
            values: wire
                .values
                .into_iter()
                .map(|row| row.into_iter().map(cell_text).collect())
                .collect(),
        }
    }
}

fn cell_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        other => other.to_string(),
    }
}

fn rows_payload(range: &str, values: Grid) -> ValueRangeWire {
    ValueRangeWire {
        range: range.to_string(),
        major_dimension: Some("ROWS".to_string()),
        values: values
            .into_iter()
            .map(|row| row.into_iter().map(Value::String).collect())
            .collect(),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DataFilterWire {
    #[serde(skip_serializing_if = "Option::is_none")]
    grid_range: Option<GridRangeWire>,
    #[serde(skip_serializing_if = "Option::is_none")]
    developer_metadata_lookup: Option<LookupWire>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GridRangeWire {
    sheet_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_row_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_row_index: Option<u32>,
}

impl From<&GridRange> for GridRangeWire {
    fn from(grid: &GridRange) -> Self {
        Self {
            sheet_id: grid.sheet_id,
            start_row_index: grid.start_row,
            end_row_index: grid.end_row,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LookupWire {
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata_location: Option<SheetLocationWire>,
    #[serde(skip_serializing_if = "Option::is_none")]
    location_matching_strategy: Option<&'static str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SheetLocationWire {
    sheet_id: i64,
}

impl From<&MetadataLookup> for LookupWire {
    fn from(lookup: &MetadataLookup) -> Self {
        Self {
            metadata_id: lookup.metadata_id,
            metadata_key: lookup.key.clone(),
            metadata_value: lookup.value.clone(),
            metadata_location: lookup.sheet_id.map(|sheet_id| SheetLocationWire { sheet_id }),
            location_matching_strategy: lookup.sheet_id.map(|_| "INTERSECTING_LOCATION"),
        }
    }
}

impl From<&DataFilter> for DataFilterWire {
    fn from(filter: &DataFilter) -> Self {
        match filter {
            DataFilter::Grid(grid) => Self {
                grid_range: Some(grid.into()),
                developer_metadata_lookup: None,
            },
            DataFilter::Metadata(lookup) => Self {
                grid_range: None,
                developer_metadata_lookup: Some(lookup.into()),
            },
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchGetByFilterRequest {
    data_filters: Vec<DataFilterWire>,
    major_dimension: &'static str,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct BatchGetByFilterResponse {
    #[serde(default)]
    value_ranges: Vec<MatchedValueRangeWire>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MatchedValueRangeWire {
    #[serde(default)]
    value_range: ValueRangeWire,
}

#[derive(Deserialize, Default)]
struct AppendResponse {
    #[serde(default)]
    updates: AppendUpdates,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct AppendUpdates {
    #[serde(default)]
    updated_range: String,
}

#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct DimensionRangeWire {
    #[serde(default)]
    sheet_id: i64,
    #[serde(default)]
    dimension: String,
    #[serde(default)]
    start_index: u32,
    #[serde(default)]
    end_index: u32,
}

impl From<RowSpan> for DimensionRangeWire {
    fn from(span: RowSpan) -> Self {
        Self {
            sheet_id: span.sheet_id,
            dimension: "ROWS".to_string(),
            start_index: span.start,
            end_index: span.end,
        }
    }
}

#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct MetadataLocationWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dimension_range: Option<DimensionRangeWire>,
}

#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct DeveloperMetadataWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata_id: Option<i64>,
    #[serde(default)]
    metadata_key: String,
    #[serde(default)]
    metadata_value: String,
    #[serde(default)]
    location: MetadataLocationWire,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    visibility: Option<String>,
}

impl DeveloperMetadataWire {
    /// Metadata not anchored to a row range is of no interest to rowsheet.
    fn into_row_metadata(self) -> Option<DeveloperMetadata> {
        let range = self.location.dimension_range?;
        if range.dimension != "ROWS" {
            return None;
        }
        Some(DeveloperMetadata {
            metadata_id: self.metadata_id.unwrap_or_default(),
            key: self.metadata_key,
            value: self.metadata_value,
            location: RowSpan {
                sheet_id: range.sheet_id,
                start: range.start_index,
                end: range.end_index,
            },
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchUpdateRequest {
    requests: Vec<RequestWire>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
enum RequestWire {
    CreateDeveloperMetadata {
        #[serde(rename = "developerMetadata")]
        developer_metadata: DeveloperMetadataWire,
    },
    DeleteDimension {
        range: DimensionRangeWire,
    },
}

impl From<StructuralRequest> for RequestWire {
    fn from(request: StructuralRequest) -> Self {
        match request {
            StructuralRequest::CreateMetadata {
                key,
                value,
                location,
            } => RequestWire::CreateDeveloperMetadata {
                developer_metadata: DeveloperMetadataWire {
                    metadata_id: None,
                    metadata_key: key,
                    metadata_value: value,
                    location: MetadataLocationWire {
                        dimension_range: Some(location.into()),
                    },
                    visibility: Some("DOCUMENT".to_string()),
                },
            },
            StructuralRequest::DeleteRows(span) => RequestWire::DeleteDimension {
                range: span.into(),
            },
        }
    }
}

#[derive(Deserialize, Default)]
struct BatchUpdateResponse {
    #[serde(default)]
    replies: Vec<ReplyWire>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ReplyWire {
    #[serde(default)]
    create_developer_metadata: Option<CreatedMetadataWire>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedMetadataWire {
    developer_metadata: DeveloperMetadataWire,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest {
    data_filters: Vec<DataFilterWire>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    matched_developer_metadata: Vec<MatchedMetadataWire>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MatchedMetadataWire {
    developer_metadata: DeveloperMetadataWire,
}

/* ─────────────────────────── gateway impl ─────────────────────────── */

impl DocumentGateway for GoogleSheets {
    fn sheets(&self, doc: &str) -> Result<Vec<Sheet>, RemoteError> {
        let url = self.url(doc, &[])?;
        let wire: SpreadsheetWire = self.send(
            self.client
                .get(url)
                .query(&[("fields", "sheets.properties")]),
        )?;
        Ok(wire
            .sheets
            .into_iter()
            .map(|s| Sheet::new(s.properties.title, s.properties.index, s.properties.sheet_id))
            .collect())
    }

    fn get_range(&self, doc: &str, range: &str) -> Result<ValueRange, RemoteError> {
        let url = self.url(doc, &["values", range])?;
        let wire: ValueRangeWire = self.send(self.client.get(url))?;
        Ok(wire.into())
    }

    fn get_by_filter(
        &self,
        doc: &str,
        filters: &[DataFilter],
    ) -> Result<Vec<ValueRange>, RemoteError> {
        let url = self.url(doc, &["values:batchGetByDataFilter"])?;
        let body = BatchGetByFilterRequest {
            data_filters: filters.iter().map(DataFilterWire::from).collect(),
            major_dimension: "ROWS",
        };
        let wire: BatchGetByFilterResponse = self.send(self.client.post(url).json(&body))?;
        Ok(wire
            .value_ranges
            .into_iter()
            .map(|m| m.value_range.into())
            .collect())
    }

    fn write_range(&self, doc: &str, range: &str, values: Grid) -> Result<(), RemoteError> {
        let url = self.url(doc, &["values", range])?;
        let body = rows_payload(range, values);
        let _: Value = self.send(
            self.client
                .put(url)
                .query(&[("valueInputOption", "RAW")])
                .json(&body),
        )?;
        Ok(())
    }

    fn append_rows(
        &self,
        doc: &str,
        range: &str,
        values: Grid,
    ) -> Result<AppendOutcome, RemoteError> {
        let url = self.url(doc, &["values", &format!("{range}:append")])?;
        let body = rows_payload(range, values);
        let wire: AppendResponse = self.send(
            self.client
                .post(url)
                .query(&[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")])
                .json(&body),
        )?;
        Ok(AppendOutcome {
            updated_range: wire.updates.updated_range,
        })
    }

    fn batch_mutate(
        &self,
        doc: &str,
        requests: Vec<StructuralRequest>,
    ) -> Result<Vec<MutationReply>, RemoteError> {
        let url = self.url(doc, &[":batchUpdate"])?;
        let body = BatchUpdateRequest {
            requests: requests.into_iter().map(RequestWire::from).collect(),
        };
        let wire: BatchUpdateResponse = self.send(self.client.post(url).json(&body))?;
        Ok(wire
            .replies
            .into_iter()
            .map(|reply| {
                reply
                    .create_developer_metadata
                    .and_then(|c| c.developer_metadata.into_row_metadata())
                    .map(MutationReply::CreatedMetadata)
                    .unwrap_or(MutationReply::DeletedRows)
            })
            .collect())
    }

    fn search_metadata(
        &self,
        doc: &str,
        lookups: &[MetadataLookup],
    ) -> Result<Vec<DeveloperMetadata>, RemoteError> {
        let url = self.url(doc, &["developerMetadata:search"])?;
        let body = SearchRequest {
            data_filters: lookups
                .iter()
                .map(|l| DataFilterWire {
                    grid_range: None,
                    developer_metadata_lookup: Some(l.into()),
                })
                .collect(),
        };
        let wire: SearchResponse = self.send(self.client.post(url).json(&body))?;
        let mut found: Vec<DeveloperMetadata> = wire
            .matched_developer_metadata
            .into_iter()
            .filter_map(|m| m.developer_metadata.into_row_metadata())
            .collect();
        found.sort_by_key(|m| (m.location.sheet_id, m.location.start, m.metadata_id));
        found.dedup_by_key(|m| m.metadata_id);
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> GoogleSheets {
        GoogleSheets::new("token").unwrap()
    }

    #[test]
    fn urls_encode_ranges_and_custom_methods() {
        let g = backend();
        assert_eq!(
            g.url("doc1", &["values", "'My Data'!A1:B2"]).unwrap().as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/doc1/values/'My%20Data'!A1:B2"
        );
        assert_eq!(
            g.url("doc1", &[":batchUpdate"]).unwrap().as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/doc1:batchUpdate"
        );
        assert_eq!(
            g.url("doc1", &["values:batchGetByDataFilter"]).unwrap().as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/doc1/values:batchGetByDataFilter"
        );
    }

    #[test]
    fn structural_requests_serialize_to_batch_update_shape() {
        let body = BatchUpdateRequest {
            requests: vec![
                StructuralRequest::CreateMetadata {
                    key: "id".into(),
                    value: "7".into(),
                    location: RowSpan::single(0, 4),
                }
                .into(),
                StructuralRequest::DeleteRows(RowSpan::single(3, 2)).into(),
            ],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"requests": [
                {"createDeveloperMetadata": {"developerMetadata": {
                    "metadataKey": "id",
                    "metadataValue": "7",
                    "location": {"dimensionRange": {
                        "sheetId": 0, "dimension": "ROWS", "startIndex": 4, "endIndex": 5
                    }},
                    "visibility": "DOCUMENT"
                }}},
                {"deleteDimension": {"range": {
                    "sheetId": 3, "dimension": "ROWS", "startIndex": 2, "endIndex": 3
                }}}
            ]})
        );
    }

    #[test]
    fn sheet_scoped_lookup_intersects_the_sheet() {
        let lookup = MetadataLookup::key("id").value("7").in_sheet(5);
        let json = serde_json::to_value(LookupWire::from(&lookup)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "metadataKey": "id",
                "metadataValue": "7",
                "metadataLocation": {"sheetId": 5},
                "locationMatchingStrategy": "INTERSECTING_LOCATION"
            })
        );
    }

    #[test]
    fn omitted_sheet_id_defaults_to_zero() {
        let wire: SpreadsheetWire = serde_json::from_str(
            r#"{"sheets":[{"properties":{"title":"Sheet1"}},{"properties":{"sheetId":9,"title":"B","index":1}}]}"#,
        )
        .unwrap();
        let ids: Vec<i64> = wire.sheets.iter().map(|s| s.properties.sheet_id).collect();
        assert_eq!(ids, vec![0, 9]);
    }

    #[test]
    fn non_string_cells_are_stringified() {
        let wire: ValueRangeWire =
            serde_json::from_str(r#"{"range":"S!A1:C1","values":[["a",3,true]]}"#).unwrap();
        let range = ValueRange::from(wire);
        assert_eq!(range.values, vec![vec!["a", "3", "TRUE"]]);
    }
}
