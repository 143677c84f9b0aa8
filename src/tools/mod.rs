//! Tool declarations and server-side implementations
//!
//! A single tool is exposed to the model: `getHouseSales`, backed by the
//! live house-sales endpoint.

mod house_sales;

pub use house_sales::{DEFAULT_HOUSE_SALES_URL, fetch_house_sales};

use serde_json::json;

use crate::provider::ToolDefinition;

/// Name of the house-sales lookup tool
pub const HOUSE_SALES_TOOL: &str = "getHouseSales";

/// Tool declarations sent with every chat request
pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![ToolDefinition {
        name: HOUSE_SALES_TOOL.to_string(),
        description: "Dapatkan data real-time tentang penjualan rumah termasuk harga, alamat, dan tanggal."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {}
        }),
    }]
}
