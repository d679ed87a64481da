use serde::{Deserialize, Serialize};

/// Offset-based pagination, the way the mobile client asks for pages.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageParams {
    #[serde(default)]
    pub skip: u64,
    #[serde(default = "default_take")]
    pub take: u64,
}

fn default_take() -> u64 {
    20
}

impl PageParams {
    pub fn offset(&self) -> i64 {
        self.skip as i64
    }

    pub fn limit(&self) -> i64 {
        self.take.min(100) as i64
    }
}

impl Default for PageParams {
    fn default() -> Self {
        Self { skip: 0, take: 20 }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Page<T: Serialize> {
    pub data: Vec<T>,
    pub total: u64,
    pub skip: u64,
    pub take: u64,
}

impl<T: Serialize> Page<T> {
    pub fn new(data: Vec<T>, total: u64, params: &PageParams) -> Self {
        Self {
            data,
            total,
            skip: params.skip,
            take: params.limit() as u64,
        }
    }
}
