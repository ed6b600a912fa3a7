//! Naming and metadata for files uploaded into a flow.
//!
//! Files go to object storage through a resumable upload endpoint under
//! `{user_id}/{flow_id}/{file_name}`. Once an upload finishes, the file is
//! registered with [`FlowApi::register_file_metadata`](crate::FlowApi::register_file_metadata)
//! using a [`FileMetadata`] payload.

use jobstream_core::FlowId;
use serde::Serialize;

/// Where one user's uploads for one flow land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub bucket: String,
    pub user_id: String,
    pub flow_id: FlowId,
}

/// Metadata fields accepted by the resumable upload endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadMetadata {
    pub bucket_name: String,
    pub object_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl UploadTarget {
    pub fn new(bucket: impl Into<String>, user_id: impl Into<String>, flow_id: FlowId) -> Self {
        Self {
            bucket: bucket.into(),
            user_id: user_id.into(),
            flow_id,
        }
    }

    /// Storage object name for `file_name`.
    pub fn object_name(&self, file_name: &str) -> String {
        format!("{}/{}/{}", self.user_id, self.flow_id, file_name)
    }

    /// Upload metadata for `file_name`. Only the fields the upload endpoint
    /// allows are included.
    pub fn metadata(&self, file_name: &str, content_type: Option<&str>) -> UploadMetadata {
        UploadMetadata {
            bucket_name: self.bucket.clone(),
            object_name: self.object_name(file_name),
            content_type: content_type
                .filter(|ct| !ct.is_empty())
                .map(str::to_string),
        }
    }

    /// Registration payload for a finished upload.
    pub fn file_metadata(
        &self,
        file_name: &str,
        file_type: Option<&str>,
        file_size: u64,
    ) -> FileMetadata {
        FileMetadata {
            flow_id: self.flow_id.clone(),
            file_name: file_name.to_string(),
            file_type: file_type.map(str::to_string),
            file_size,
        }
    }
}

/// Body of the file metadata registration request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileMetadata {
    pub flow_id: FlowId,
    pub file_name: String,
    pub file_type: Option<String>,
    /// Size in bytes.
    pub file_size: u64,
}
