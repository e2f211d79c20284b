//! Arena index newtypes. Nodes and connections live in flat `Vec`s owned by
//! `Network`; everything else refers to them by index instead of by
//! reference, which is what breaks the node/connection/gater reference cycle
//! described in the design notes.

/// Index into `Network::nodes`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct NodeId(pub usize);

/// Index into the connection arena (`Network::conn_pool`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct ConnId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum NodeKind {
    Input,
    Hidden,
    Output,
    Constant,
}

impl NodeKind {
    pub fn name(self) -> &'static str {
        match self {
            NodeKind::Input => "input",
            NodeKind::Hidden => "hidden",
            NodeKind::Output => "output",
            NodeKind::Constant => "constant",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "input" => Some(NodeKind::Input),
            "hidden" => Some(NodeKind::Hidden),
            "output" => Some(NodeKind::Output),
            "constant" => Some(NodeKind::Constant),
            _ => None,
        }
    }
}
