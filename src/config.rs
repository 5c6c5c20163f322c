/// Fixed catalogues and store layout, passed explicitly to the services.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostelConfig {
    pub app_id: String,
    pub blocks: Vec<String>,
    pub floors: Vec<u8>,
    pub categories: Vec<String>,
}

const DEFAULT_APP_ID: &str = "hostel-issues-tracker";
const DEFAULT_BLOCKS: &[&str] = &["A", "B", "C", "D"];
const DEFAULT_FLOORS: &[u8] = &[1, 2, 3, 4];
const DEFAULT_CATEGORIES: &[&str] = &[
    "Cleaning", "Water Filter", "Washroom Repair", "Lift Issue",
    "WiFi/Network", "Power Supply", "Pest Control", "Other",
];

impl Default for HostelConfig {
    fn default() -> Self {
        Self {
            app_id: DEFAULT_APP_ID.to_string(),
            blocks: DEFAULT_BLOCKS.iter().map(|s| s.to_string()).collect(),
            floors: DEFAULT_FLOORS.to_vec(),
            categories: DEFAULT_CATEGORIES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl HostelConfig {
    /// Read overrides from `HOSTEL_*` variables; unset or unparsable values keep the defaults.
    pub fn from_env() -> Self {
        fn list_env(name: &str) -> Option<Vec<String>> {
            let raw = std::env::var(name).ok()?;
            let items: Vec<String> = raw.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
            if items.is_empty() { None } else { Some(items) }
        }
        let defaults = Self::default();
        let floors = list_env("HOSTEL_FLOORS")
            .and_then(|v| v.iter().map(|f| f.parse::<u8>().ok()).collect::<Option<Vec<_>>>())
            .unwrap_or(defaults.floors);
        Self {
            app_id: std::env::var("HOSTEL_APP_ID").ok().filter(|s| !s.trim().is_empty()).unwrap_or(defaults.app_id),
            blocks: list_env("HOSTEL_BLOCKS").unwrap_or(defaults.blocks),
            floors,
            categories: list_env("HOSTEL_CATEGORIES").unwrap_or(defaults.categories),
        }
    }

    pub fn issues_path(&self) -> String {
        format!("artifacts/{}/public/data/issue-tracker-issues", self.app_id)
    }

    pub fn claims_path(&self) -> String {
        format!("artifacts/{}/public/data/consolidation-keys", self.app_id)
    }

    pub fn profiles_path(&self) -> String {
        format!("artifacts/{}/profiles", self.app_id)
    }

    pub fn has_block(&self, block: &str) -> bool { self.blocks.iter().any(|b| b == block) }
    pub fn has_floor(&self, floor: u8) -> bool { self.floors.contains(&floor) }
    pub fn has_category(&self, category: &str) -> bool { self.categories.iter().any(|c| c == category) }
}
