//! Live menu bar access through the macOS Accessibility API
//!
//! [`AxHost`] is the production [`AccessibilityHost`]: it resolves the
//! application element for a pid, hands out its `AXMenuBar`, and talks to
//! `NSRunningApplication` for liveness, activation and bundle location.
//!
//! ## Architecture
//!
//! AXApplication -> AXMenuBar -> AXMenuBarItem -> AXMenu -> AXMenuItem
//!
//! Every [`AxElement`] owns one retain on its `AXUIElementRef` and releases it
//! on drop, so subtrees can be handed around without manual bookkeeping.
//!
//! ## Permissions
//!
//! Requires Accessibility permission in System Settings > Privacy & Security > Accessibility

// Note: #[cfg(target_os = "macos")] is applied at the lib.rs level
#![allow(non_upper_case_globals)]

use anyhow::{bail, Context, Result};
use macos_accessibility_client::accessibility;
use objc::runtime::{Class, Object};
use objc::{msg_send, sel, sel_impl};
use std::ffi::c_void;
use std::path::PathBuf;
use tracing::{debug, info, instrument};

use crate::bundle_info::read_bundle_metadata;
use crate::menu_tree::{AccessibilityHost, MenuAction, MenuElement};
use crate::model::{BundleMetadata, TargetApp};

// ============================================================================
// CoreFoundation FFI bindings
// ============================================================================

#[link(name = "CoreFoundation", kind = "framework")]
extern "C" {
    fn CFRelease(cf: *const c_void);
    fn CFRetain(cf: *const c_void) -> *const c_void;
    fn CFStringCreateWithCString(
        alloc: *const c_void,
        c_str: *const i8,
        encoding: u32,
    ) -> CFStringRef;
    fn CFStringGetCString(
        string: CFStringRef,
        buffer: *mut i8,
        buffer_size: i64,
        encoding: u32,
    ) -> bool;
    fn CFStringGetLength(string: CFStringRef) -> i64;
    fn CFArrayGetCount(array: CFArrayRef) -> i64;
    fn CFArrayGetValueAtIndex(array: CFArrayRef, index: i64) -> CFTypeRef;
    fn CFGetTypeID(cf: CFTypeRef) -> u64;
    fn CFStringGetTypeID() -> u64;
    fn CFArrayGetTypeID() -> u64;
    fn CFNumberGetValue(number: CFTypeRef, number_type: i32, value_ptr: *mut c_void) -> bool;
    fn CFNumberGetTypeID() -> u64;
    fn CFBooleanGetValue(boolean: CFTypeRef) -> bool;
    fn CFBooleanGetTypeID() -> u64;
}

// ============================================================================
// ApplicationServices (Accessibility) FFI bindings
// ============================================================================

#[link(name = "ApplicationServices", kind = "framework")]
extern "C" {
    fn AXUIElementCreateApplication(pid: i32) -> AXUIElementRef;
    fn AXUIElementCopyAttributeValue(
        element: AXUIElementRef,
        attribute: CFStringRef,
        value: *mut CFTypeRef,
    ) -> i32;
    fn AXUIElementPerformAction(element: AXUIElementRef, action: CFStringRef) -> i32;
}

// AXError codes
const kAXErrorSuccess: i32 = 0;
const kAXErrorAPIDisabled: i32 = -25211;
const kAXErrorNoValue: i32 = -25212;

const kCFStringEncodingUTF8: u32 = 0x08000100;
const kCFNumberSInt64Type: i32 = 4;

/// NSApplicationActivateIgnoringOtherApps
const ACTIVATE_IGNORING_OTHER_APPS: u64 = 1;

type AXUIElementRef = *const c_void;
type CFTypeRef = *const c_void;
type CFStringRef = *const c_void;
type CFArrayRef = *const c_void;

// AX attribute names
const AX_MENU_BAR: &str = "AXMenuBar";
const AX_CHILDREN: &str = "AXChildren";
const AX_TITLE: &str = "AXTitle";
const AX_ROLE: &str = "AXRole";
const AX_ENABLED: &str = "AXEnabled";
const AX_MENU_ITEM_CMD_CHAR: &str = "AXMenuItemCmdChar";
const AX_MENU_ITEM_CMD_VIRTUAL_KEY: &str = "AXMenuItemCmdVirtualKey";
const AX_MENU_ITEM_CMD_MODIFIERS: &str = "AXMenuItemCmdModifiers";

// ============================================================================
// CoreFoundation helpers
// ============================================================================

/// An owned CoreFoundation reference, released on drop
struct CfOwned(CFTypeRef);

impl CfOwned {
    /// Take ownership of a +1 reference; None for null
    fn new(cf: CFTypeRef) -> Option<Self> {
        if cf.is_null() {
            None
        } else {
            Some(Self(cf))
        }
    }

    fn string(s: &str) -> Result<Self> {
        let c_str = std::ffi::CString::new(s).context("Attribute name contains NUL")?;
        let cf = unsafe {
            CFStringCreateWithCString(std::ptr::null(), c_str.as_ptr(), kCFStringEncodingUTF8)
        };
        Self::new(cf).context("Failed to create CFString")
    }

    fn as_ptr(&self) -> CFTypeRef {
        self.0
    }

    fn has_type(&self, type_id: u64) -> bool {
        unsafe { CFGetTypeID(self.0) == type_id }
    }
}

impl Drop for CfOwned {
    fn drop(&mut self) {
        unsafe { CFRelease(self.0) }
    }
}

/// Convert a CFString to a Rust String
fn cf_string_to_string(cf_string: CFStringRef) -> Option<String> {
    if cf_string.is_null() {
        return None;
    }

    unsafe {
        let length = CFStringGetLength(cf_string);
        if length <= 0 {
            return Some(String::new());
        }

        // Room for UTF-8 expansion
        let buffer_size = (length * 4 + 1) as usize;
        let mut buffer: Vec<i8> = vec![0; buffer_size];

        if CFStringGetCString(
            cf_string,
            buffer.as_mut_ptr(),
            buffer_size as i64,
            kCFStringEncodingUTF8,
        ) {
            let c_str = std::ffi::CStr::from_ptr(buffer.as_ptr());
            c_str.to_str().ok().map(|s| s.to_string())
        } else {
            None
        }
    }
}

// ============================================================================
// AXUIElement wrapper
// ============================================================================

/// One retained node of a foreign application's accessibility tree
#[derive(Debug)]
pub struct AxElement(AXUIElementRef);

impl AxElement {
    /// The application element for `pid`
    fn application(pid: i32) -> Option<Self> {
        let element = unsafe { AXUIElementCreateApplication(pid) };
        if element.is_null() {
            None
        } else {
            Some(Self(element))
        }
    }

    /// Wrap a borrowed reference (e.g. an array member), adding a retain
    fn retained(element: AXUIElementRef) -> Option<Self> {
        if element.is_null() {
            None
        } else {
            Some(Self(unsafe { CFRetain(element) }))
        }
    }

    fn attribute(&self, attribute: &str) -> Result<CfOwned> {
        let name = CfOwned::string(attribute)?;
        let mut value: CFTypeRef = std::ptr::null();

        let result = unsafe {
            AXUIElementCopyAttributeValue(self.0, name.as_ptr(), &mut value as *mut CFTypeRef)
        };

        match result {
            kAXErrorSuccess => CfOwned::new(value)
                .with_context(|| format!("No value for attribute: {}", attribute)),
            kAXErrorAPIDisabled => bail!("Accessibility API is disabled"),
            kAXErrorNoValue => bail!("No value for attribute: {}", attribute),
            _ => bail!("Failed to get attribute {}: error {}", attribute, result),
        }
    }

    fn string_attribute(&self, attribute: &str) -> Option<String> {
        let value = self.attribute(attribute).ok()?;
        if value.has_type(unsafe { CFStringGetTypeID() }) {
            cf_string_to_string(value.as_ptr())
        } else {
            None
        }
    }

    fn bool_attribute(&self, attribute: &str) -> Option<bool> {
        let value = self.attribute(attribute).ok()?;
        if value.has_type(unsafe { CFBooleanGetTypeID() }) {
            Some(unsafe { CFBooleanGetValue(value.as_ptr()) })
        } else {
            None
        }
    }

    fn number_attribute(&self, attribute: &str) -> Option<i64> {
        let value = self.attribute(attribute).ok()?;
        if !value.has_type(unsafe { CFNumberGetTypeID() }) {
            return None;
        }
        let mut number: i64 = 0;
        let ok = unsafe {
            CFNumberGetValue(
                value.as_ptr(),
                kCFNumberSInt64Type,
                &mut number as *mut _ as *mut c_void,
            )
        };
        ok.then_some(number)
    }

    fn element_attribute(&self, attribute: &str) -> Result<AxElement> {
        let value = self.attribute(attribute)?;
        // The copied value already carries our +1
        let element = AxElement(value.as_ptr());
        std::mem::forget(value);
        Ok(element)
    }
}

impl Drop for AxElement {
    fn drop(&mut self) {
        unsafe { CFRelease(self.0) }
    }
}

impl MenuElement for AxElement {
    fn title(&self) -> Option<String> {
        self.string_attribute(AX_TITLE)
    }

    fn role(&self) -> Option<String> {
        self.string_attribute(AX_ROLE)
    }

    fn enabled(&self) -> Option<bool> {
        self.bool_attribute(AX_ENABLED)
    }

    fn cmd_char(&self) -> Option<String> {
        self.string_attribute(AX_MENU_ITEM_CMD_CHAR)
    }

    fn cmd_virtual_key(&self) -> Option<u32> {
        self.number_attribute(AX_MENU_ITEM_CMD_VIRTUAL_KEY)
            .and_then(|code| u32::try_from(code).ok())
    }

    fn cmd_modifiers(&self) -> Option<u32> {
        self.number_attribute(AX_MENU_ITEM_CMD_MODIFIERS)
            .and_then(|mask| u32::try_from(mask).ok())
    }

    fn children(&self) -> Result<Vec<Self>> {
        let array = self.attribute(AX_CHILDREN)?;
        if !array.has_type(unsafe { CFArrayGetTypeID() }) {
            bail!("{} is not an array", AX_CHILDREN);
        }

        let count = unsafe { CFArrayGetCount(array.as_ptr()) };
        let children = (0..count)
            .filter_map(|i| AxElement::retained(unsafe { CFArrayGetValueAtIndex(array.as_ptr(), i) }))
            .collect();
        Ok(children)
    }

    fn perform(&self, action: MenuAction) -> Result<()> {
        let name = CfOwned::string(action.ax_name())?;
        let result = unsafe { AXUIElementPerformAction(self.0, name.as_ptr()) };

        match result {
            kAXErrorSuccess => Ok(()),
            kAXErrorAPIDisabled => bail!("Accessibility API is disabled"),
            _ => bail!("Failed to perform action {}: error {}", action.ax_name(), result),
        }
    }
}

// ============================================================================
// Objective-C helpers
// ============================================================================

/// Convert an NSString to a Rust String
///
/// # Safety
/// `nsstring` must be null or a valid NSString
pub(crate) unsafe fn get_nsstring(nsstring: *mut Object) -> Option<String> {
    if nsstring.is_null() {
        return None;
    }

    let utf8: *const i8 = msg_send![nsstring, UTF8String];
    if utf8.is_null() {
        return None;
    }

    std::ffi::CStr::from_ptr(utf8)
        .to_str()
        .ok()
        .map(|s| s.to_string())
}

/// Create an autoreleased NSString
///
/// # Safety
/// Must be called with an autorelease pool in place
pub(crate) unsafe fn objc_nsstring(s: &str) -> Option<*mut Object> {
    let class = Class::get("NSString")?;
    let c_str = std::ffi::CString::new(s).ok()?;
    let nsstring: *mut Object = msg_send![class, stringWithUTF8String: c_str.as_ptr()];
    (!nsstring.is_null()).then_some(nsstring)
}

/// Describe an `NSRunningApplication`
///
/// # Safety
/// `app` must be null or a valid NSRunningApplication
pub(crate) unsafe fn target_from_running_app(app: *mut Object) -> Option<TargetApp> {
    if app.is_null() {
        return None;
    }

    let bundle_id = get_nsstring(msg_send![app, bundleIdentifier])?;
    let name = get_nsstring(msg_send![app, localizedName]).unwrap_or_else(|| bundle_id.clone());
    let pid: i32 = msg_send![app, processIdentifier];

    let bundle_url: *mut Object = msg_send![app, bundleURL];
    let bundle_path = if bundle_url.is_null() {
        None
    } else {
        get_nsstring(msg_send![bundle_url, path]).map(PathBuf::from)
    };

    let target = TargetApp::new(name, bundle_id, pid);
    Some(match bundle_path {
        Some(path) => target.with_bundle_path(path),
        None => target,
    })
}

/// `NSRunningApplication` for `pid`, or null
unsafe fn running_application(pid: i32) -> *mut Object {
    match Class::get("NSRunningApplication") {
        Some(class) => msg_send![class, runningApplicationWithProcessIdentifier: pid],
        None => std::ptr::null_mut(),
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Whether this process may read other applications' accessibility trees
pub fn has_accessibility_permission() -> bool {
    let granted = accessibility::application_is_trusted();
    debug!(granted, "Checked accessibility permission");
    granted
}

/// Ask for the permission (shows the system prompt)
#[instrument]
pub fn request_accessibility_permission() -> bool {
    info!("Requesting accessibility permission for menu reading");
    accessibility::application_is_trusted_with_prompt()
}

/// First running instance of `bundle_id`
pub fn find_running(bundle_id: &str) -> Option<TargetApp> {
    objc::rc::autoreleasepool(|| unsafe {
        let class = Class::get("NSRunningApplication")?;
        let id = objc_nsstring(bundle_id)?;
        let apps: *mut Object = msg_send![class, runningApplicationsWithBundleIdentifier: id];
        if apps.is_null() {
            return None;
        }
        let count: usize = msg_send![apps, count];
        if count == 0 {
            return None;
        }
        let app: *mut Object = msg_send![apps, objectAtIndex: 0usize];
        target_from_running_app(app)
    })
}

/// The application that currently owns the system menu bar
pub fn menu_bar_owner() -> Option<TargetApp> {
    objc::rc::autoreleasepool(|| unsafe {
        let workspace_class = Class::get("NSWorkspace")?;
        let workspace: *mut Object = msg_send![workspace_class, sharedWorkspace];
        let app: *mut Object = msg_send![workspace, menuBarOwningApplication];
        target_from_running_app(app)
    })
}

/// Accessibility host backed by the running system
#[derive(Debug, Default, Clone, Copy)]
pub struct AxHost;

impl AxHost {
    pub fn new() -> Self {
        Self
    }
}

impl AccessibilityHost for AxHost {
    type Element = AxElement;

    fn menu_bar(&self, app: &TargetApp) -> Option<AxElement> {
        let application = AxElement::application(app.pid)?;
        match application.element_attribute(AX_MENU_BAR) {
            Ok(menu_bar) => Some(menu_bar),
            Err(e) => {
                debug!(bundle_id = %app.bundle_id, pid = app.pid, error = %e, "No menu bar");
                None
            }
        }
    }

    fn bring_to_front(&self, app: &TargetApp) -> Result<()> {
        objc::rc::autoreleasepool(|| unsafe {
            let running = running_application(app.pid);
            if running.is_null() {
                bail!("No running application for pid {}", app.pid);
            }
            let activated: bool =
                msg_send![running, activateWithOptions: ACTIVATE_IGNORING_OTHER_APPS];
            if !activated {
                bail!("Failed to activate {}", app.bundle_id);
            }
            debug!(bundle_id = %app.bundle_id, "Brought application to front");
            Ok(())
        })
    }

    fn is_running(&self, app: &TargetApp) -> bool {
        objc::rc::autoreleasepool(|| unsafe {
            let running = running_application(app.pid);
            if running.is_null() {
                return false;
            }
            let terminated: bool = msg_send![running, isTerminated];
            let bundle_id = get_nsstring(msg_send![running, bundleIdentifier]);
            !terminated && bundle_id.as_deref() == Some(app.bundle_id.as_str())
        })
    }

    fn bundle_metadata(&self, app: &TargetApp) -> Option<BundleMetadata> {
        let path = match &app.bundle_path {
            Some(path) => path.clone(),
            None => objc::rc::autoreleasepool(|| unsafe {
                target_from_running_app(running_application(app.pid))
                    .and_then(|running| running.bundle_path)
            })?,
        };
        read_bundle_metadata(&path)
    }
}
