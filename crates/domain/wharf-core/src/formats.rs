use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ContentHash;

/// One batch of a populate negotiation: wire path keys to content hashes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PopulateRequest {
    pub files: BTreeMap<String, ContentHash>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PopulateResponse {
    pub upload_url: String,
    #[serde(default)]
    pub upload_required_hashes: Vec<ContentHash>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn populate_response_uses_camel_case_keys() {
        let parsed: PopulateResponse = serde_json::from_str(
            r#"{"uploadUrl":"https://upload.example/site/v1","uploadRequiredHashes":["ab","cd"]}"#,
        )
        .unwrap();
        assert_eq!(parsed.upload_url, "https://upload.example/site/v1");
        assert_eq!(parsed.upload_required_hashes, vec!["ab", "cd"]);
    }

    #[test]
    fn missing_required_hashes_means_nothing_to_upload() {
        let parsed: PopulateResponse =
            serde_json::from_str(r#"{"uploadUrl":"https://upload.example"}"#).unwrap();
        assert!(parsed.upload_required_hashes.is_empty());
    }

    #[test]
    fn populate_request_serializes_files_object() {
        let mut files = BTreeMap::new();
        files.insert("/index.html".to_string(), "0a1b".to_string());
        let body = serde_json::to_string(&PopulateRequest { files }).unwrap();
        assert_eq!(body, r#"{"files":{"/index.html":"0a1b"}}"#);
    }
}
