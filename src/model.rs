use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResultItem {
    #[serde(rename = "productId")]
    pub product_id: i64,
    /// Similarity percentage, 0–100, rounded to two decimals.
    pub similarity: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResultItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    #[serde(rename = "totalVectors")]
    pub total_vectors: usize,
    #[serde(rename = "totalProducts")]
    pub total_products: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebuildAccepted {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub service: String,
    pub status: String,
    pub model: String,
}
