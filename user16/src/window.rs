//! Window Table
//!
//! In-memory window manager used as the engine's window collaborator: it
//! answers ownership and hierarchy queries, hit-tests screen points, maps
//! coordinates, tracks which windows need painting, and runs window
//! procedures.
//!
//! # Window Hierarchy
//!
//! - Desktop window (root, owned by no task)
//!   - Top-level windows (overlapped, popup)
//!     - Child windows
//!
//! All window rectangles are in screen coordinates.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use bitflags::bitflags;
use log::{debug, warn};

use crate::env::{
    CoordinateMapper, HitTestProvider, PaintTarget, PaintTracker, WindowDirectory, WindowInfo,
    WindowProcInvoker, HTBORDER, HTCAPTION, HTCLIENT, HTERROR, HTNOWHERE,
};
use crate::input::MA_ACTIVATE;
use crate::message::{
    lparam_to_point, WM_ERASEBKGND, WM_MOUSEACTIVATE, WM_NCHITTEST, WM_PAINT, WM_PAINTICON,
};
use crate::sched::Task;
use crate::{Point, Rect, TaskId, HWND};

// ============================================================================
// Styles
// ============================================================================

bitflags! {
    /// Window styles (WS_*)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WindowStyle: u32 {
        /// Overlapped window (default)
        const OVERLAPPED = 0x00000000;
        /// Popup window
        const POPUP = 0x80000000;
        /// Child window
        const CHILD = 0x40000000;
        /// Minimized
        const MINIMIZE = 0x20000000;
        const VISIBLE = 0x10000000;
        /// Input goes nowhere (HTERROR)
        const DISABLED = 0x08000000;
        const CLIPSIBLINGS = 0x04000000;
        const CLIPCHILDREN = 0x02000000;
        /// Has caption
        const CAPTION = 0x00C00000;
        /// Has border
        const BORDER = 0x00800000;
        /// Has dialog frame
        const DLGFRAME = 0x00400000;
        /// Has system menu
        const SYSMENU = 0x00080000;
        /// Has thick frame (resizable)
        const THICKFRAME = 0x00040000;

        /// Overlapped window with caption, system menu and sizing frame
        const OVERLAPPEDWINDOW = Self::OVERLAPPED.bits() | Self::CAPTION.bits() |
            Self::SYSMENU.bits() | Self::THICKFRAME.bits();
    }
}

bitflags! {
    /// Extended window styles (WS_EX_*)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WindowStyleEx: u32 {
        /// Dialog modal frame
        const DLGMODALFRAME = 0x00000001;
        /// No WM_PARENTNOTIFY for clicks in this child
        const NOPARENTNOTIFY = 0x00000004;
        /// Topmost
        const TOPMOST = 0x00000008;
    }
}

bitflags! {
    /// Class styles (CS_*)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ClassStyle: u32 {
        /// Redraw if height changes
        const VREDRAW = 0x0001;
        /// Redraw if width changes
        const HREDRAW = 0x0002;
        /// Send double-click messages
        const DBLCLKS = 0x0008;
        /// Save bits under window
        const SAVEBITS = 0x0800;
    }
}

/// Window procedure: (task, hwnd, message, wparam, lparam)
pub type WndProc = Arc<dyn Fn(&Task, HWND, u32, usize, isize) -> isize + Send + Sync>;

/// Default screen size for the desktop window
pub const SCREEN_WIDTH: i32 = 640;
pub const SCREEN_HEIGHT: i32 = 480;

// ============================================================================
// Window Structure
// ============================================================================

/// Creation parameters
#[derive(Clone)]
pub struct WindowDesc {
    pub owner: Option<TaskId>,
    pub parent: HWND,
    pub style: WindowStyle,
    pub ex_style: WindowStyleEx,
    pub class_style: ClassStyle,
    /// Class has an icon (minimized windows get WM_PAINTICON)
    pub class_icon: bool,
    pub rect: Rect,
    pub proc_: Option<WndProc>,
}

impl WindowDesc {
    /// Visible top-level window without decorations
    pub fn top_level(owner: TaskId, rect: Rect) -> Self {
        WindowDesc {
            owner: Some(owner),
            parent: HWND::NULL,
            style: WindowStyle::VISIBLE,
            ex_style: WindowStyleEx::empty(),
            class_style: ClassStyle::empty(),
            class_icon: false,
            rect,
            proc_: None,
        }
    }

    /// Visible child of `parent`
    pub fn child(owner: TaskId, parent: HWND, rect: Rect) -> Self {
        WindowDesc {
            parent,
            style: WindowStyle::CHILD | WindowStyle::VISIBLE,
            ..Self::top_level(owner, rect)
        }
    }

    pub fn style(mut self, style: WindowStyle) -> Self {
        self.style = style;
        self
    }

    pub fn ex_style(mut self, ex_style: WindowStyleEx) -> Self {
        self.ex_style = ex_style;
        self
    }

    pub fn class_style(mut self, class_style: ClassStyle) -> Self {
        self.class_style = class_style;
        self
    }

    pub fn class_icon(mut self) -> Self {
        self.class_icon = true;
        self
    }

    pub fn proc_<F>(mut self, proc_: F) -> Self
    where
        F: Fn(&Task, HWND, u32, usize, isize) -> isize + Send + Sync + 'static,
    {
        self.proc_ = Some(Arc::new(proc_));
        self
    }
}

/// Window object
#[derive(Clone)]
struct Window {
    owner: Option<TaskId>,
    parent: HWND,
    style: WindowStyle,
    ex_style: WindowStyleEx,
    class_style: ClassStyle,
    class_icon: bool,
    /// Window rectangle (screen coordinates)
    rect: Rect,
    /// Update region is non-empty
    needs_paint: bool,
    /// RDW_INTERNALPAINT request
    internal_paint: bool,
    /// WM_PAINT dispatched, BeginPaint not yet called
    needs_begin_paint: bool,
    /// Z-order value (higher = on top)
    z_order: u32,
    proc_: Option<WndProc>,
}

impl Window {
    fn info(&self) -> WindowInfo {
        WindowInfo {
            owner: self.owner,
            parent: self.parent,
            style: self.style,
            ex_style: self.ex_style,
            class_style: self.class_style,
        }
    }

    /// Check if window has caption
    fn has_caption(&self) -> bool {
        self.style.contains(WindowStyle::CAPTION)
    }

    /// Check if window has border
    fn has_border(&self) -> bool {
        self.style.contains(WindowStyle::BORDER) ||
        self.style.contains(WindowStyle::DLGFRAME) ||
        self.style.contains(WindowStyle::THICKFRAME)
    }

    /// Calculate non-client area metrics
    fn frame_metrics(&self) -> FrameMetrics {
        let mut metrics = FrameMetrics::default();

        if self.has_caption() {
            metrics.caption_height = 20; // Classic caption height
        }

        if self.has_border() {
            if self.style.contains(WindowStyle::THICKFRAME) {
                metrics.border_width = 4; // Sizeable border
            } else if self.style.contains(WindowStyle::DLGFRAME) {
                metrics.border_width = 3; // Dialog border
            } else {
                metrics.border_width = 1; // Thin border
            }
        }

        metrics
    }

    /// Client area origin in screen coordinates
    fn client_origin(&self) -> Point {
        let metrics = self.frame_metrics();
        Point::new(
            self.rect.left + metrics.border_width,
            self.rect.top + metrics.border_width + metrics.caption_height,
        )
    }

    /// Client rectangle in client coordinates
    fn client_rect(&self) -> Rect {
        let metrics = self.frame_metrics();
        Rect::new(
            0,
            0,
            self.rect.width() - 2 * metrics.border_width,
            self.rect.height() - 2 * metrics.border_width - metrics.caption_height,
        )
    }

    fn is_shown(&self) -> bool {
        self.style.contains(WindowStyle::VISIBLE) && !self.style.contains(WindowStyle::MINIMIZE)
    }

    /// Classify a screen point against this window's regions
    fn hit_test(&self, pt: Point) -> i16 {
        if !self.rect.contains_point(pt) {
            return HTNOWHERE;
        }
        if self.style.contains(WindowStyle::DISABLED) {
            return HTERROR;
        }
        let metrics = self.frame_metrics();
        let border = metrics.border_width;
        if pt.x < self.rect.left + border
            || pt.x >= self.rect.right - border
            || pt.y < self.rect.top + border
            || pt.y >= self.rect.bottom - border
        {
            return HTBORDER;
        }
        if pt.y < self.rect.top + border + metrics.caption_height {
            return HTCAPTION;
        }
        HTCLIENT
    }
}

/// Frame metrics for non-client area
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameMetrics {
    pub border_width: i32,
    pub caption_height: i32,
}

// ============================================================================
// Window Table
// ============================================================================

/// In-memory window manager
pub struct WindowTable {
    windows: spin::Mutex<BTreeMap<HWND, Window>>,
    desktop: HWND,
    next_handle: AtomicU32,
    next_z_order: AtomicU32,
}

impl Default for WindowTable {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowTable {
    pub fn new() -> Self {
        Self::with_screen(SCREEN_WIDTH, SCREEN_HEIGHT)
    }

    /// Create the table and its desktop window
    pub fn with_screen(width: i32, height: i32) -> Self {
        let desktop = HWND::from_raw(0x10);
        let mut windows = BTreeMap::new();
        windows.insert(
            desktop,
            Window {
                owner: None,
                parent: HWND::NULL,
                style: WindowStyle::VISIBLE | WindowStyle::CLIPCHILDREN,
                ex_style: WindowStyleEx::empty(),
                class_style: ClassStyle::empty(),
                class_icon: false,
                rect: Rect::new(0, 0, width, height),
                needs_paint: false,
                internal_paint: false,
                needs_begin_paint: false,
                z_order: 0,
                proc_: None,
            },
        );
        debug!("[USER/Window] Window manager initialized, desktop={}", desktop);
        Self {
            windows: spin::Mutex::new(windows),
            desktop,
            next_handle: AtomicU32::new(desktop.raw() + 1),
            next_z_order: AtomicU32::new(1),
        }
    }

    /// Create a window. Returns NULL when the parent does not exist.
    pub fn create_window(&self, desc: WindowDesc) -> HWND {
        let mut windows = self.windows.lock();
        let parent = if desc.parent.is_valid() { desc.parent } else { self.desktop };
        if !windows.contains_key(&parent) {
            warn!("[USER/Window] Parent {} does not exist", parent);
            return HWND::NULL;
        }

        let hwnd = HWND::from_raw(self.next_handle.fetch_add(1, Ordering::Relaxed));
        windows.insert(
            hwnd,
            Window {
                owner: desc.owner,
                parent,
                style: desc.style,
                ex_style: desc.ex_style,
                class_style: desc.class_style,
                class_icon: desc.class_icon,
                rect: desc.rect,
                needs_paint: false,
                internal_paint: false,
                needs_begin_paint: false,
                z_order: self.next_z_order.fetch_add(1, Ordering::Relaxed),
                proc_: desc.proc_,
            },
        );
        debug!("[USER/Window] Created window {} (parent {}, owner {:?})", hwnd, parent, desc.owner);
        hwnd
    }

    pub fn set_window_proc<F>(&self, hwnd: HWND, proc_: F) -> bool
    where
        F: Fn(&Task, HWND, u32, usize, isize) -> isize + Send + Sync + 'static,
    {
        self.with_window_mut(hwnd, |wnd| wnd.proc_ = Some(Arc::new(proc_)))
            .is_some()
    }

    /// Destroy a window and its descendants
    pub fn destroy_window(&self, hwnd: HWND) -> bool {
        if hwnd == self.desktop {
            return false;
        }
        let mut windows = self.windows.lock();
        if windows.remove(&hwnd).is_none() {
            return false;
        }
        // Destroy children
        let mut doomed = vec![hwnd];
        while let Some(parent) = doomed.pop() {
            let children: Vec<HWND> = windows
                .iter()
                .filter(|(_, w)| w.parent == parent)
                .map(|(&h, _)| h)
                .collect();
            for child in children {
                windows.remove(&child);
                doomed.push(child);
            }
        }
        debug!("[USER/Window] Destroyed window {}", hwnd);
        true
    }

    /// Get mutable access to window (via callback)
    fn with_window_mut<R>(&self, hwnd: HWND, f: impl FnOnce(&mut Window) -> R) -> Option<R> {
        self.windows.lock().get_mut(&hwnd).map(f)
    }

    fn with_window<R>(&self, hwnd: HWND, f: impl FnOnce(&Window) -> R) -> Option<R> {
        self.windows.lock().get(&hwnd).map(f)
    }

    pub fn window_rect(&self, hwnd: HWND) -> Option<Rect> {
        self.with_window(hwnd, |w| w.rect)
    }

    pub fn client_rect(&self, hwnd: HWND) -> Option<Rect> {
        self.with_window(hwnd, Window::client_rect)
    }

    pub fn client_origin(&self, hwnd: HWND) -> Option<Point> {
        self.with_window(hwnd, Window::client_origin)
    }

    pub fn frame_metrics(&self, hwnd: HWND) -> Option<FrameMetrics> {
        self.with_window(hwnd, Window::frame_metrics)
    }

    /// Move a window
    pub fn move_window(&self, hwnd: HWND, rect: Rect, repaint: bool) -> bool {
        self.with_window_mut(hwnd, |wnd| {
            wnd.rect = rect;
            if repaint {
                wnd.needs_paint = true;
            }
        })
        .is_some()
    }

    /// Bring window to top of z-order
    pub fn bring_to_top(&self, hwnd: HWND) -> bool {
        let z = self.next_z_order.fetch_add(1, Ordering::Relaxed);
        self.with_window_mut(hwnd, |wnd| wnd.z_order = z).is_some()
    }

    pub fn show_window(&self, hwnd: HWND, show: bool) -> bool {
        self.with_window_mut(hwnd, |wnd| wnd.style.set(WindowStyle::VISIBLE, show))
            .is_some()
    }

    pub fn enable_window(&self, hwnd: HWND, enable: bool) -> bool {
        self.with_window_mut(hwnd, |wnd| wnd.style.set(WindowStyle::DISABLED, !enable))
            .is_some()
    }

    pub fn minimize(&self, hwnd: HWND, minimized: bool) -> bool {
        self.with_window_mut(hwnd, |wnd| {
            wnd.style.set(WindowStyle::MINIMIZE, minimized);
            wnd.needs_paint = true;
        })
        .is_some()
    }

    // ========================================================================
    // Painting
    // ========================================================================

    /// Mark the whole window invalid. Wake the owner with QS_PAINT for a
    /// blocked task to notice.
    pub fn invalidate(&self, hwnd: HWND) -> bool {
        self.with_window_mut(hwnd, |wnd| wnd.needs_paint = true).is_some()
    }

    pub fn validate(&self, hwnd: HWND) -> bool {
        self.with_window_mut(hwnd, |wnd| wnd.needs_paint = false).is_some()
    }

    /// Request a WM_PAINT without invalidating anything
    pub fn set_internal_paint(&self, hwnd: HWND) -> bool {
        self.with_window_mut(hwnd, |wnd| wnd.internal_paint = true).is_some()
    }

    pub fn needs_paint(&self, hwnd: HWND) -> bool {
        self.with_window(hwnd, |w| w.needs_paint).unwrap_or(false)
    }

    /// Start painting: validates the window and returns the client rect
    pub fn begin_paint(&self, hwnd: HWND) -> Option<Rect> {
        self.with_window_mut(hwnd, |wnd| {
            wnd.needs_paint = false;
            wnd.needs_begin_paint = false;
            wnd.client_rect()
        })
    }

    // ========================================================================
    // Default Procedure
    // ========================================================================

    /// Default handling for messages a window procedure does not process
    pub fn def_window_proc(&self, hwnd: HWND, message: u32, _wparam: usize, lparam: isize) -> isize {
        match message {
            WM_MOUSEACTIVATE => MA_ACTIVATE,
            WM_PAINT | WM_PAINTICON => {
                self.begin_paint(hwnd);
                0
            }
            WM_ERASEBKGND => 1,
            WM_NCHITTEST => self
                .with_window(hwnd, |w| w.hit_test(lparam_to_point(lparam)))
                .unwrap_or(HTNOWHERE) as isize,
            _ => 0,
        }
    }

    /// Topmost shown window among `candidates` containing `pt`
    fn topmost_at<'a>(
        pt: Point,
        candidates: impl Iterator<Item = (&'a HWND, &'a Window)>,
    ) -> Option<HWND> {
        candidates
            .filter(|(_, wnd)| wnd.is_shown() && wnd.rect.contains_point(pt))
            .max_by_key(|(_, wnd)| wnd.z_order)
            .map(|(&hwnd, _)| hwnd)
    }
}

// ============================================================================
// Collaborator Interfaces
// ============================================================================

impl WindowDirectory for WindowTable {
    fn window_info(&self, hwnd: HWND) -> Option<WindowInfo> {
        self.with_window(hwnd, Window::info)
    }

    fn desktop(&self) -> HWND {
        self.desktop
    }

    fn top_level_windows(&self) -> Vec<HWND> {
        let windows = self.windows.lock();
        let mut tops: Vec<(HWND, u32)> = windows
            .iter()
            .filter(|&(&h, w)| h != self.desktop && !w.style.contains(WindowStyle::CHILD))
            .map(|(&h, w)| (h, w.z_order))
            .collect();
        tops.sort_by(|a, b| b.1.cmp(&a.1));
        tops.into_iter().map(|(h, _)| h).collect()
    }
}

impl HitTestProvider for WindowTable {
    fn window_from_point(&self, pt: Point) -> (HWND, i16) {
        let windows = self.windows.lock();
        let desktop = self.desktop;

        // Find topmost top-level window containing this point
        let Some(mut hwnd) = Self::topmost_at(
            pt,
            windows
                .iter()
                .filter(|&(&h, w)| h != desktop && !w.style.contains(WindowStyle::CHILD)),
        ) else {
            return (desktop, HTNOWHERE);
        };

        // Descend into children
        loop {
            let Some(wnd) = windows.get(&hwnd) else {
                return (desktop, HTNOWHERE);
            };
            if wnd.style.contains(WindowStyle::DISABLED) || wnd.hit_test(pt) != HTCLIENT {
                return (hwnd, wnd.hit_test(pt));
            }
            let parent = hwnd;
            match Self::topmost_at(
                pt,
                windows
                    .iter()
                    .filter(|(_, w)| w.parent == parent && w.style.contains(WindowStyle::CHILD)),
            ) {
                Some(child) => hwnd = child,
                None => return (hwnd, HTCLIENT),
            }
        }
    }
}

impl CoordinateMapper for WindowTable {
    fn screen_to_client(&self, hwnd: HWND, pt: Point) -> Point {
        match self.client_origin(hwnd) {
            Some(origin) => Point::new(pt.x - origin.x, pt.y - origin.y),
            None => pt,
        }
    }

    fn client_to_screen(&self, hwnd: HWND, pt: Point) -> Point {
        match self.client_origin(hwnd) {
            Some(origin) => Point::new(pt.x + origin.x, pt.y + origin.y),
            None => pt,
        }
    }
}

impl WindowProcInvoker for WindowTable {
    fn call_window_proc(&self, task: &Task, hwnd: HWND, message: u32, wparam: usize, lparam: isize) -> isize {
        let proc_ = match self.with_window(hwnd, |w| w.proc_.clone()) {
            Some(p) => p,
            None => return 0,
        };
        match proc_ {
            Some(proc_) => proc_(task, hwnd, message, wparam, lparam),
            None => self.def_window_proc(hwnd, message, wparam, lparam),
        }
    }
}

impl PaintTracker for WindowTable {
    fn find_window_to_repaint(&self, scope: HWND, task: TaskId) -> Option<PaintTarget> {
        let candidates: Vec<(HWND, bool, bool)> = {
            let windows = self.windows.lock();
            windows
                .iter()
                .filter(|(_, w)| {
                    w.owner == Some(task)
                        && w.style.contains(WindowStyle::VISIBLE)
                        && (w.needs_paint || w.internal_paint)
                })
                .map(|(&h, w)| {
                    let iconic = w.style.contains(WindowStyle::MINIMIZE) && w.class_icon;
                    (h, iconic, !w.needs_paint)
                })
                .collect()
        };
        candidates
            .into_iter()
            .find(|&(hwnd, _, _)| !scope.is_valid() || hwnd == scope || self.is_child(scope, hwnd))
            .map(|(hwnd, iconic, internal_only)| PaintTarget { hwnd, iconic, internal_only })
    }

    fn clear_internal_paint(&self, hwnd: HWND) {
        self.with_window_mut(hwnd, |w| w.internal_paint = false);
    }

    fn begin_paint_dispatch(&self, hwnd: HWND) {
        self.with_window_mut(hwnd, |w| w.needs_begin_paint = true);
    }

    fn paint_acknowledged(&self, hwnd: HWND) -> bool {
        self.with_window(hwnd, |w| !w.needs_begin_paint || !w.needs_paint)
            .unwrap_or(true)
    }

    fn force_validate(&self, hwnd: HWND) {
        self.with_window_mut(hwnd, |w| {
            w.needs_begin_paint = false;
            w.needs_paint = false;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> TaskId {
        TaskId::from_raw(1)
    }

    #[test]
    fn desktop_has_no_owner() {
        let table = WindowTable::new();
        let desktop = table.desktop();
        assert!(table.is_window(desktop));
        assert_eq!(table.owner(desktop), None);
        assert_eq!(table.window_from_point(Point::new(5, 5)), (desktop, HTNOWHERE));
        assert!(!table.destroy_window(desktop));
    }

    #[test]
    fn hit_test_regions() {
        let table = WindowTable::new();
        let hwnd = table.create_window(
            WindowDesc::top_level(owner(), Rect::new(100, 100, 300, 300))
                .style(WindowStyle::VISIBLE | WindowStyle::CAPTION),
        );
        // CAPTION includes the thin border
        assert_eq!(table.window_from_point(Point::new(100, 150)), (hwnd, HTBORDER));
        assert_eq!(table.window_from_point(Point::new(150, 105)), (hwnd, HTCAPTION));
        assert_eq!(table.window_from_point(Point::new(150, 200)), (hwnd, HTCLIENT));
        assert_eq!(table.client_origin(hwnd), Some(Point::new(101, 121)));

        table.enable_window(hwnd, false);
        assert_eq!(table.window_from_point(Point::new(150, 200)), (hwnd, HTERROR));
    }

    #[test]
    fn deepest_child_by_z_order() {
        let table = WindowTable::new();
        let top = table.create_window(WindowDesc::top_level(owner(), Rect::new(0, 0, 200, 200)));
        let low = table.create_window(WindowDesc::child(owner(), top, Rect::new(10, 10, 100, 100)));
        let high = table.create_window(WindowDesc::child(owner(), top, Rect::new(50, 50, 150, 150)));
        let inner = table.create_window(WindowDesc::child(owner(), low, Rect::new(20, 20, 40, 40)));

        assert_eq!(table.window_from_point(Point::new(60, 60)).0, high);
        assert_eq!(table.window_from_point(Point::new(30, 30)).0, inner);
        assert_eq!(table.window_from_point(Point::new(180, 20)).0, top);

        table.bring_to_top(low);
        assert_eq!(table.window_from_point(Point::new(60, 60)).0, low);

        assert!(table.is_child(top, inner));
        assert!(!table.is_child(high, inner));
        assert_eq!(table.top_level(inner), top);
    }

    #[test]
    fn coordinates_round_trip() {
        let table = WindowTable::new();
        let hwnd = table.create_window(
            WindowDesc::top_level(owner(), Rect::new(40, 60, 240, 260))
                .style(WindowStyle::VISIBLE | WindowStyle::THICKFRAME),
        );
        let client = table.screen_to_client(hwnd, Point::new(50, 70));
        assert_eq!(client, Point::new(6, 6));
        assert_eq!(table.client_to_screen(hwnd, client), Point::new(50, 70));
        assert_eq!(table.client_rect(hwnd), Some(Rect::new(0, 0, 192, 192)));
    }

    #[test]
    fn destroy_removes_descendants() {
        let table = WindowTable::new();
        let top = table.create_window(WindowDesc::top_level(owner(), Rect::new(0, 0, 200, 200)));
        let child = table.create_window(WindowDesc::child(owner(), top, Rect::new(10, 10, 100, 100)));
        let grandchild = table.create_window(WindowDesc::child(owner(), child, Rect::new(20, 20, 40, 40)));

        assert!(table.destroy_window(top));
        assert!(!table.is_window(child));
        assert!(!table.is_window(grandchild));
        assert_eq!(table.create_window(WindowDesc::child(owner(), top, Rect::default())), HWND::NULL);
    }

    #[test]
    fn paint_tracking() {
        let table = WindowTable::new();
        let top = table.create_window(WindowDesc::top_level(owner(), Rect::new(0, 0, 200, 200)));
        let child = table.create_window(WindowDesc::child(owner(), top, Rect::new(10, 10, 100, 100)));
        assert_eq!(table.find_window_to_repaint(HWND::NULL, owner()), None);

        table.invalidate(child);
        table.set_internal_paint(top);
        let target = table.find_window_to_repaint(HWND::NULL, owner()).unwrap();
        assert_eq!((target.hwnd, target.internal_only), (top, true));
        assert_eq!(table.find_window_to_repaint(child, owner()).map(|t| t.hwnd), Some(child));
        assert_eq!(table.find_window_to_repaint(HWND::NULL, TaskId::from_raw(2)), None);

        table.clear_internal_paint(top);
        table.begin_paint_dispatch(child);
        assert!(!table.paint_acknowledged(child));
        table.begin_paint(child);
        assert!(table.paint_acknowledged(child));
        assert_eq!(table.find_window_to_repaint(HWND::NULL, owner()), None);

        table.minimize(top, true);
        assert_eq!(table.find_window_to_repaint(HWND::NULL, owner()).map(|t| t.iconic), Some(false));
    }

    #[test]
    fn broadcast_candidates_are_top_level() {
        let table = WindowTable::new();
        let a = table.create_window(WindowDesc::top_level(owner(), Rect::default()));
        let b = table.create_window(WindowDesc::top_level(owner(), Rect::default()));
        table.create_window(WindowDesc::child(owner(), a, Rect::default()));
        assert_eq!(table.top_level_windows(), vec![b, a]);
    }
}
