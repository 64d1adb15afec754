//! In-memory menu trees and a scriptable host
//!
//! Lets walker and coordinator behaviour be exercised without a live
//! application or an accessibility grant.
//!
//! ```ignore
//! use menukeys::menu_tree::fixture::*;
//!
//! let root = menu_bar(vec![bar_item("File", vec![item("New").cmd("n", 0)])]).build();
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use super::{
    AccessibilityHost, MenuAction, MenuElement, AX_ROLE_MENU, AX_ROLE_MENU_BAR,
    AX_ROLE_MENU_BAR_ITEM, AX_ROLE_MENU_ITEM,
};
use crate::model::{BundleMetadata, TargetApp};

// ============================================================================
// Tree builder
// ============================================================================

/// Owned description of a node, turned into a [`FixtureElement`] by `build`
#[derive(Debug, Clone, Default)]
pub struct FixtureNode {
    title: Option<String>,
    role: Option<String>,
    enabled: Option<bool>,
    cmd_char: Option<String>,
    virtual_key: Option<u32>,
    modifiers: Option<u32>,
    children: Vec<FixtureNode>,
    lazy: bool,
    unreadable: bool,
}

impl FixtureNode {
    pub fn new(role: Option<&str>) -> Self {
        Self {
            role: role.map(str::to_string),
            ..Default::default()
        }
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    /// Literal key character + modifier mask
    pub fn cmd(mut self, key: &str, modifiers: u32) -> Self {
        self.cmd_char = Some(key.to_string());
        self.modifiers = Some(modifiers);
        self
    }

    /// Virtual key code + modifier mask
    pub fn virtual_key(mut self, code: u32, modifiers: u32) -> Self {
        self.virtual_key = Some(code);
        self.modifiers = Some(modifiers);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = Some(false);
        self
    }

    /// Children only appear after the node has been opened
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    /// Reading children fails
    pub fn unreadable(mut self) -> Self {
        self.unreadable = true;
        self
    }

    pub fn child(mut self, child: FixtureNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = FixtureNode>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn build(self) -> FixtureElement {
        let children = self.children.into_iter().map(FixtureNode::build).collect();
        FixtureElement(Arc::new(NodeData {
            title: self.title,
            role: self.role,
            enabled: self.enabled,
            cmd_char: self.cmd_char,
            virtual_key: self.virtual_key,
            modifiers: self.modifiers,
            children,
            lazy: self.lazy,
            unreadable: self.unreadable,
            opened: Mutex::new(false),
            actions: Mutex::new(Vec::new()),
        }))
    }
}

/// The AXMenuBar root
pub fn menu_bar(items: Vec<FixtureNode>) -> FixtureNode {
    FixtureNode::new(Some(AX_ROLE_MENU_BAR)).children(items)
}

/// A top-level menu bar item whose entries sit inside an untitled AXMenu
pub fn bar_item(title: &str, entries: Vec<FixtureNode>) -> FixtureNode {
    FixtureNode::new(Some(AX_ROLE_MENU_BAR_ITEM))
        .title(title)
        .child(menu(entries))
}

/// An untitled AXMenu container
pub fn menu(entries: Vec<FixtureNode>) -> FixtureNode {
    FixtureNode::new(Some(AX_ROLE_MENU)).children(entries)
}

/// An AXMenuItem without a shortcut
pub fn item(title: &str) -> FixtureNode {
    FixtureNode::new(Some(AX_ROLE_MENU_ITEM)).title(title)
}

/// A submenu item: AXMenuItem -> AXMenu -> entries
pub fn submenu(title: &str, entries: Vec<FixtureNode>) -> FixtureNode {
    item(title).child(menu(entries))
}

pub fn separator() -> FixtureNode {
    FixtureNode::new(Some(AX_ROLE_MENU_ITEM))
}

// ============================================================================
// Element
// ============================================================================

#[derive(Debug)]
struct NodeData {
    title: Option<String>,
    role: Option<String>,
    enabled: Option<bool>,
    cmd_char: Option<String>,
    virtual_key: Option<u32>,
    modifiers: Option<u32>,
    children: Vec<FixtureElement>,
    lazy: bool,
    unreadable: bool,
    opened: Mutex<bool>,
    actions: Mutex<Vec<MenuAction>>,
}

/// Shared handle to a built fixture node
#[derive(Debug, Clone)]
pub struct FixtureElement(Arc<NodeData>);

impl FixtureElement {
    /// Actions performed on this node, in order
    pub fn actions(&self) -> Vec<MenuAction> {
        self.0.actions.lock().clone()
    }

    /// Depth-first search by title
    pub fn find(&self, title: &str) -> Option<FixtureElement> {
        if self.0.title.as_deref() == Some(title) {
            return Some(self.clone());
        }
        self.0.children.iter().find_map(|child| child.find(title))
    }
}

impl MenuElement for FixtureElement {
    fn title(&self) -> Option<String> {
        self.0.title.clone()
    }

    fn role(&self) -> Option<String> {
        self.0.role.clone()
    }

    fn enabled(&self) -> Option<bool> {
        self.0.enabled
    }

    fn cmd_char(&self) -> Option<String> {
        self.0.cmd_char.clone()
    }

    fn cmd_virtual_key(&self) -> Option<u32> {
        self.0.virtual_key
    }

    fn cmd_modifiers(&self) -> Option<u32> {
        self.0.modifiers
    }

    fn children(&self) -> anyhow::Result<Vec<Self>> {
        if self.0.unreadable {
            anyhow::bail!("No value for attribute: AXChildren");
        }
        if self.0.lazy && !*self.0.opened.lock() {
            return Ok(Vec::new());
        }
        Ok(self.0.children.clone())
    }

    fn perform(&self, action: MenuAction) -> anyhow::Result<()> {
        self.0.actions.lock().push(action);
        if action == MenuAction::Open {
            *self.0.opened.lock() = true;
        }
        Ok(())
    }
}

// ============================================================================
// Host
// ============================================================================

/// One-shot gate a scan can be parked on
#[derive(Debug, Default)]
pub struct Latch {
    open: Mutex<bool>,
    cond: Condvar,
}

impl Latch {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn open(&self) {
        *self.open.lock() = true;
        self.cond.notify_all();
    }

    /// Wait until opened; gives up after `timeout` so a broken test can't hang
    pub fn wait(&self, timeout: Duration) -> bool {
        let mut open = self.open.lock();
        let _ = self.cond.wait_while_for(&mut open, |open| !*open, timeout);
        *open
    }
}

#[derive(Debug, Default)]
struct FixtureApp {
    root: Option<FixtureElement>,
    metadata: Option<BundleMetadata>,
    running: bool,
    /// `menu_bar` returns None this many times before succeeding
    menu_bar_failures: usize,
    /// `menu_bar` panics, as a misbehaving FFI call would
    panics: bool,
    gate: Option<Arc<Latch>>,
}

#[derive(Debug, Default)]
struct HostCounters {
    menu_bar_requests: HashMap<String, usize>,
    bring_to_front: HashMap<String, usize>,
}

/// Scriptable [`AccessibilityHost`] backed by fixture trees
#[derive(Debug, Default)]
pub struct FixtureHost {
    apps: Mutex<HashMap<String, FixtureApp>>,
    counters: Mutex<HostCounters>,
}

impl FixtureHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a running app with a menu tree and bundle metadata
    pub fn add_app(&self, bundle_id: &str, root: FixtureNode, metadata: BundleMetadata) {
        self.apps.lock().insert(
            bundle_id.to_string(),
            FixtureApp {
                root: Some(root.build()),
                metadata: Some(metadata),
                running: true,
                ..Default::default()
            },
        );
    }

    /// Replace the menu tree (e.g. to tell a fresh scan from a cached one)
    pub fn set_root(&self, bundle_id: &str, root: FixtureNode) {
        if let Some(app) = self.apps.lock().get_mut(bundle_id) {
            app.root = Some(root.build());
        }
    }

    pub fn set_metadata(&self, bundle_id: &str, metadata: Option<BundleMetadata>) {
        if let Some(app) = self.apps.lock().get_mut(bundle_id) {
            app.metadata = metadata;
        }
    }

    pub fn set_running(&self, bundle_id: &str, running: bool) {
        if let Some(app) = self.apps.lock().get_mut(bundle_id) {
            app.running = running;
        }
    }

    pub fn fail_menu_bar(&self, bundle_id: &str, times: usize) {
        if let Some(app) = self.apps.lock().get_mut(bundle_id) {
            app.menu_bar_failures = times;
        }
    }

    pub fn panic_on_menu_bar(&self, bundle_id: &str, panics: bool) {
        if let Some(app) = self.apps.lock().get_mut(bundle_id) {
            app.panics = panics;
        }
    }

    /// Park scans of `bundle_id` until the returned latch is opened
    pub fn gate(&self, bundle_id: &str) -> Arc<Latch> {
        let latch = Latch::new();
        if let Some(app) = self.apps.lock().get_mut(bundle_id) {
            app.gate = Some(latch.clone());
        }
        latch
    }

    pub fn menu_bar_requests(&self, bundle_id: &str) -> usize {
        self.counters
            .lock()
            .menu_bar_requests
            .get(bundle_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn bring_to_front_calls(&self, bundle_id: &str) -> usize {
        self.counters
            .lock()
            .bring_to_front
            .get(bundle_id)
            .copied()
            .unwrap_or(0)
    }
}

impl AccessibilityHost for FixtureHost {
    type Element = FixtureElement;

    fn menu_bar(&self, app: &TargetApp) -> Option<FixtureElement> {
        *self
            .counters
            .lock()
            .menu_bar_requests
            .entry(app.bundle_id.clone())
            .or_default() += 1;

        let (gate, panics) = self
            .apps
            .lock()
            .get(&app.bundle_id)
            .map(|fixture| (fixture.gate.clone(), fixture.panics))
            .unwrap_or_default();
        if let Some(gate) = gate {
            gate.wait(Duration::from_secs(10));
        }
        if panics {
            panic!("menu bar of {} exploded", app.bundle_id);
        }

        let mut apps = self.apps.lock();
        let fixture = apps.get_mut(&app.bundle_id)?;
        if fixture.menu_bar_failures > 0 {
            fixture.menu_bar_failures -= 1;
            return None;
        }
        fixture.root.clone()
    }

    fn bring_to_front(&self, app: &TargetApp) -> anyhow::Result<()> {
        *self
            .counters
            .lock()
            .bring_to_front
            .entry(app.bundle_id.clone())
            .or_default() += 1;
        Ok(())
    }

    fn is_running(&self, app: &TargetApp) -> bool {
        self.apps
            .lock()
            .get(&app.bundle_id)
            .map(|fixture| fixture.running)
            .unwrap_or(false)
    }

    fn bundle_metadata(&self, app: &TargetApp) -> Option<BundleMetadata> {
        self.apps
            .lock()
            .get(&app.bundle_id)
            .and_then(|fixture| fixture.metadata.clone())
    }
}
