/// Filter fields for [`crate::InventoryStore::get_plugins`].
///
/// An empty/`None` field matches any value; the `hidden` bit is excluded
/// from results unless `include_hidden` is set.
#[derive(Debug, Clone, Default)]
pub struct PluginFilter {
    pub name: Option<String>,
    pub target: Option<String>,
    pub version: Option<String>,
    pub os: Option<String>,
    pub arch: Option<String>,
    pub publisher: Option<String>,
    pub vendor: Option<String>,
    pub include_hidden: bool,
}

/// Filter fields for [`crate::InventoryStore::get_plugin_groups`].
#[derive(Debug, Clone, Default)]
pub struct GroupFilter {
    pub vendor: Option<String>,
    pub publisher: Option<String>,
    pub name: Option<String>,
    pub version: Option<String>,
    pub include_hidden: bool,
}
