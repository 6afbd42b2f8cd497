// -
// Coordination-service path namespaces

/// Parent node whose children are the decimal ids of live brokers
pub(crate) const BROKER_IDS_PATH: &str = "brokers/ids";

/// Node holding one broker's `creator:host:port` registration value
pub(crate) fn broker_node_path(id: u32) -> String {
    format!("{}/{}", BROKER_IDS_PATH, id)
}
