//! Menu tree walker
//!
//! Walks a foreign application's menu bar and produces the flat, ordered list
//! of [`ShortcutEntry`] values for every command that carries a shortcut.
//!
//! ## Architecture
//!
//! The hierarchy is: AXApplication -> AXMenuBar -> AXMenuBarItem -> AXMenu -> AXMenuItem
//! (-> AXMenu -> AXMenuItem for submenus).
//!
//! The walk is split in two halves:
//!
//! - pure decoding ([`classify_role`], [`decode_node`]) that turns one node's
//!   attributes into an optional entry and the menu path for its children
//! - a traversal driver ([`walk_menu_tree`], [`MenuWalker`]) that performs the
//!   foreign calls through the [`MenuElement`] and [`AccessibilityHost`] traits
//!
//! The macOS implementation of those traits lives in `menu_bar`; tests use the
//! in-memory tree from [`fixture`].
//!
//! ## Lazy menus
//!
//! Some applications only populate a top-level menu once it is opened. Children
//! are always read first; only when a menu bar item reports none is it opened
//! (`AXPress`), given a short moment to populate, re-read, and closed again
//! (`AXCancel`). Opening every menu unconditionally would make the menu bar
//! flicker.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use crate::config::{
    DEFAULT_ACTIVATION_WAIT_MS, DEFAULT_MAX_MENU_DEPTH, DEFAULT_MENU_BAR_RETRIES,
    DEFAULT_RETRY_BACKOFF_MS,
};
use crate::error::{ResultExt, ScanError};
use crate::model::{BundleMetadata, ShortcutEntry, TargetApp};
use crate::shortcut::decode_shortcut;

#[cfg(any(test, feature = "test-support"))]
pub mod fixture;

// ============================================================================
// AX constants
// ============================================================================

/// AX role values
pub const AX_ROLE_MENU_BAR: &str = "AXMenuBar";
pub const AX_ROLE_MENU_BAR_ITEM: &str = "AXMenuBarItem";
pub const AX_ROLE_MENU: &str = "AXMenu";
pub const AX_ROLE_MENU_ITEM: &str = "AXMenuItem";

/// Synthetic actions used for lazily populated menus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    /// Open the menu (`AXPress`)
    Open,
    /// Close it again (`AXCancel`)
    Close,
}

impl MenuAction {
    pub fn ax_name(self) -> &'static str {
        match self {
            MenuAction::Open => "AXPress",
            MenuAction::Close => "AXCancel",
        }
    }
}

// ============================================================================
// Platform seams
// ============================================================================

/// One node of a foreign accessibility tree.
///
/// Attribute reads return `None` when the attribute is missing or has an
/// unexpected type.
pub trait MenuElement: Sized {
    fn title(&self) -> Option<String>;
    fn role(&self) -> Option<String>;
    fn enabled(&self) -> Option<bool>;
    /// `AXMenuItemCmdChar`
    fn cmd_char(&self) -> Option<String>;
    /// `AXMenuItemCmdVirtualKey`
    fn cmd_virtual_key(&self) -> Option<u32>;
    /// `AXMenuItemCmdModifiers`
    fn cmd_modifiers(&self) -> Option<u32>;
    fn children(&self) -> anyhow::Result<Vec<Self>>;
    fn perform(&self, action: MenuAction) -> anyhow::Result<()>;

    /// Snapshot every attribute the decoder needs
    fn attributes(&self) -> NodeAttributes {
        NodeAttributes {
            title: self.title(),
            role: self.role(),
            enabled: self.enabled(),
            cmd_char: self.cmd_char(),
            virtual_key: self.cmd_virtual_key(),
            modifiers: self.cmd_modifiers(),
        }
    }
}

/// Access to running applications and their accessibility roots
pub trait AccessibilityHost: Send + Sync + 'static {
    type Element: MenuElement;

    /// The application's AXMenuBar element, if it can be obtained right now
    fn menu_bar(&self, app: &TargetApp) -> Option<Self::Element>;

    /// Make the application frontmost (many apps only expose their menu bar then)
    fn bring_to_front(&self, app: &TargetApp) -> anyhow::Result<()>;

    /// Whether the process behind `app` still exists
    fn is_running(&self, app: &TargetApp) -> bool;

    /// Version and bundle modification time, for fingerprinting
    fn bundle_metadata(&self, app: &TargetApp) -> Option<BundleMetadata>;
}

/// Whether accessibility introspection is currently permitted
pub trait PermissionGate: Send + Sync {
    fn is_granted(&self) -> bool;
}

impl<F> PermissionGate for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_granted(&self) -> bool {
        self()
    }
}

// ============================================================================
// Pure decoding
// ============================================================================

/// Raw attributes of one node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeAttributes {
    pub title: Option<String>,
    pub role: Option<String>,
    pub enabled: Option<bool>,
    pub cmd_char: Option<String>,
    pub virtual_key: Option<u32>,
    pub modifiers: Option<u32>,
}

/// Walker classification of a node role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A top-level item in the menu bar (may populate lazily)
    MenuBarItem,
    /// The menu bar itself or a menu container
    Container,
    /// A command; the only kind that produces entries
    Command,
    /// No role, or a role we don't know; traversed but never emitted
    Opaque,
}

pub fn classify_role(role: Option<&str>) -> NodeKind {
    match role {
        Some(AX_ROLE_MENU_BAR_ITEM) => NodeKind::MenuBarItem,
        Some(AX_ROLE_MENU_BAR) | Some(AX_ROLE_MENU) => NodeKind::Container,
        Some(AX_ROLE_MENU_ITEM) => NodeKind::Command,
        _ => NodeKind::Opaque,
    }
}

/// Result of decoding one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedNode {
    pub kind: NodeKind,
    /// Menu path handed to the node's children
    pub path: Vec<String>,
    pub entry: Option<ShortcutEntry>,
}

/// Decode a node given the menu path of its parent.
///
/// Untitled nodes (separators, menu containers) are transparent: they don't
/// extend the path and never produce an entry.
pub fn decode_node(attrs: &NodeAttributes, parent_path: &[String]) -> DecodedNode {
    let kind = classify_role(attrs.role.as_deref());

    let title = attrs
        .title
        .as_deref()
        .filter(|title| !title.trim().is_empty());

    let Some(title) = title else {
        return DecodedNode {
            kind,
            path: parent_path.to_vec(),
            entry: None,
        };
    };

    let mut path = parent_path.to_vec();
    path.push(title.to_string());

    let entry = if kind == NodeKind::Command {
        decode_shortcut(attrs.cmd_char.as_deref(), attrs.virtual_key, attrs.modifiers).map(
            |label| ShortcutEntry {
                title: title.to_string(),
                shortcut_label: Some(label),
                menu_path: path.clone(),
                enabled: attrs.enabled.unwrap_or(true),
                role_tag: attrs.role.clone().unwrap_or_default(),
            },
        )
    } else {
        None
    };

    DecodedNode { kind, path, entry }
}

// ============================================================================
// Traversal driver
// ============================================================================

/// Tunables for one walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkOptions {
    /// Wait after opening a lazily populated menu
    pub activation_wait: Duration,
    /// Subtrees deeper than this are skipped
    pub max_depth: usize,
    /// Additional menu bar attempts after bringing the app forward
    pub menu_bar_retries: u32,
    /// Backoff before retry `n` is `retry_backoff * n`
    pub retry_backoff: Duration,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            activation_wait: Duration::from_millis(DEFAULT_ACTIVATION_WAIT_MS),
            max_depth: DEFAULT_MAX_MENU_DEPTH,
            menu_bar_retries: DEFAULT_MENU_BAR_RETRIES,
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
        }
    }
}

/// Everything one traversal produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkOutcome {
    pub entries: Vec<ShortcutEntry>,
    /// Subtrees dropped by the depth bound
    pub skipped_subtrees: usize,
    /// Top-level menus that had to be opened to populate
    pub lazy_menus_opened: usize,
    /// Nodes whose children couldn't be read
    pub unreadable_nodes: usize,
}

/// Depth-first pre-order walk starting at `root` (normally the AXMenuBar)
pub fn walk_menu_tree<E: MenuElement>(root: &E, options: &WalkOptions) -> WalkOutcome {
    let mut outcome = WalkOutcome::default();
    visit(root, &[], 0, options, &mut outcome);
    if outcome.skipped_subtrees > 0 {
        warn!(
            skipped = outcome.skipped_subtrees,
            max_depth = options.max_depth,
            "Menu tree deeper than allowed, subtrees skipped"
        );
    }
    outcome
}

fn visit<E: MenuElement>(
    node: &E,
    parent_path: &[String],
    depth: usize,
    options: &WalkOptions,
    outcome: &mut WalkOutcome,
) {
    if depth > options.max_depth {
        outcome.skipped_subtrees += 1;
        return;
    }

    let decoded = decode_node(&node.attributes(), parent_path);
    if let Some(entry) = decoded.entry {
        outcome.entries.push(entry);
    }

    for child in read_children(node, decoded.kind, options, outcome) {
        visit(&child, &decoded.path, depth + 1, options, outcome);
    }
}

fn read_children<E: MenuElement>(
    node: &E,
    kind: NodeKind,
    options: &WalkOptions,
    outcome: &mut WalkOutcome,
) -> Vec<E> {
    let children = children_or_empty(node, outcome);
    if !children.is_empty() || kind != NodeKind::MenuBarItem {
        return children;
    }

    // Lazily populated top-level menu: open, wait, re-read, always close
    outcome.lazy_menus_opened += 1;
    if let Err(e) = node.perform(MenuAction::Open) {
        debug!(error = %e, "Failed to open lazy menu");
    }
    thread::sleep(options.activation_wait);
    let children = children_or_empty(node, outcome);
    node.perform(MenuAction::Close).warn_on_err();

    debug!(child_count = children.len(), "Re-read lazy menu after opening");
    children
}

fn children_or_empty<E: MenuElement>(node: &E, outcome: &mut WalkOutcome) -> Vec<E> {
    match node.children() {
        Ok(children) => children,
        Err(e) => {
            debug!(error = %e, "Could not read menu children");
            outcome.unreadable_nodes += 1;
            Vec::new()
        }
    }
}

/// Reads complete shortcut lists from running applications
pub struct MenuWalker<H: AccessibilityHost> {
    host: Arc<H>,
    options: WalkOptions,
}

impl<H: AccessibilityHost> MenuWalker<H> {
    pub fn new(host: Arc<H>, options: WalkOptions) -> Self {
        Self { host, options }
    }

    pub fn host(&self) -> &Arc<H> {
        &self.host
    }

    pub fn options(&self) -> &WalkOptions {
        &self.options
    }

    /// Walk the whole menu bar of `app`.
    ///
    /// Fails only when the menu bar itself can't be obtained; unreadable
    /// subtrees are skipped and the rest is returned.
    #[instrument(skip(self, app), fields(bundle_id = %app.bundle_id, pid = app.pid))]
    pub fn scan(&self, app: &TargetApp) -> Result<Vec<ShortcutEntry>, ScanError> {
        let start = Instant::now();
        let menu_bar = self.acquire_menu_bar(app)?;
        let outcome = walk_menu_tree(&menu_bar, &self.options);

        info!(
            entry_count = outcome.entries.len(),
            lazy_menus_opened = outcome.lazy_menus_opened,
            unreadable_nodes = outcome.unreadable_nodes,
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Scanned menu bar"
        );
        Ok(outcome.entries)
    }

    fn acquire_menu_bar(&self, app: &TargetApp) -> Result<H::Element, ScanError> {
        if let Some(menu_bar) = self.host.menu_bar(app) {
            return Ok(menu_bar);
        }

        for attempt in 1..=self.options.menu_bar_retries {
            debug!(attempt, "Menu bar unavailable, bringing application forward");
            self.host.bring_to_front(app).warn_on_err();
            thread::sleep(self.options.retry_backoff * attempt);

            if let Some(menu_bar) = self.host.menu_bar(app) {
                return Ok(menu_bar);
            }
        }

        warn!(bundle_id = %app.bundle_id, "Menu bar inaccessible after retries");
        Err(ScanError::MenuBarInaccessible {
            bundle_id: app.bundle_id.clone(),
        })
    }
}

#[cfg(test)]
#[path = "menu_tree_tests.rs"]
mod tests;
