//! Closure-backed host relay
//!
//! [`HostRelay`] owns a heap-allocated [`HostContext`] whose raw callbacks
//! are trampolines into boxed Rust closures. Its address never changes, so
//! it can be stored in a VM's foreign slot for as long as the relay lives.

use crate::config::RelayConfig;
use crate::context::{ForeignSlot, HostContext, RawCallback};
use crate::types::{string_from_native, NativeChar, RelayError, Result, Stream};
use std::panic::{self, AssertUnwindSafe};
use std::ptr::{self, NonNull};

/// Host-side handler for one diagnostic stream
pub type Callback = Box<dyn FnMut(&str)>;

#[repr(C)]
struct RelayState<C: NativeChar> {
    // Must stay first: the trampolines cast the context pointer back
    context: HostContext<C>,
    print: Option<Callback>,
    error: Option<Callback>,
}

/// Closure slot for `stream`, projected without borrowing the whole state
///
/// A dispatch may be running on either stream while the other one is
/// touched, so no `&mut RelayState` is ever formed once the relay is live.
unsafe fn slot_ptr<C: NativeChar>(state: *mut RelayState<C>, stream: Stream) -> *mut Option<Callback> {
    match stream {
        Stream::Print => ptr::addr_of_mut!((*state).print),
        Stream::Error => ptr::addr_of_mut!((*state).error),
    }
}

unsafe fn context_field<C: NativeChar>(state: *mut RelayState<C>) -> *mut HostContext<C> {
    ptr::addr_of_mut!((*state).context)
}

/// Owned host context routing VM diagnostics to Rust closures
pub struct HostRelay<C: NativeChar = u8> {
    state: NonNull<RelayState<C>>,
}

impl<C: NativeChar> HostRelay<C> {
    /// Create a relay printing to stdout and stderr
    pub fn new() -> Self {
        Self::from_config(&RelayConfig::default())
    }

    /// Create a relay with no callbacks; every diagnostic is dropped
    pub fn silent() -> Self {
        let state = Box::new(RelayState {
            context: HostContext::empty(),
            print: None,
            error: None,
        });
        Self {
            state: NonNull::from(Box::leak(state)),
        }
    }

    /// Create a relay from a sink configuration
    pub fn from_config(config: &RelayConfig) -> Self {
        let mut relay = Self::silent();
        for stream in [Stream::Print, Stream::Error] {
            let callback = config
                .sink(stream)
                .callback(stream, config.strip_trailing_newline);
            relay.set_callback(stream, callback);
        }
        relay
    }

    /// Builder method: handle print diagnostics with `f`
    pub fn with_print<F: FnMut(&str) + 'static>(mut self, f: F) -> Self {
        self.set_callback(Stream::Print, Some(Box::new(f)));
        self
    }

    /// Builder method: handle error diagnostics with `f`
    pub fn with_error<F: FnMut(&str) + 'static>(mut self, f: F) -> Self {
        self.set_callback(Stream::Error, Some(Box::new(f)));
        self
    }

    /// Install or remove the closure for `stream`
    ///
    /// `None` also clears the raw callback, so the relay no-ops for that
    /// stream. May be called from inside a running closure; the
    /// replacement stays installed once that closure returns.
    pub fn set_callback(&mut self, stream: Stream, callback: Option<Callback>) {
        let trampoline = callback.as_ref().map(|_| trampoline_for::<C>(stream));
        // SAFETY: the state is owned by this handle and only written through
        // field pointers. A closure running for `stream` has been moved out
        // of its slot by `dispatch`, so overwriting the slot never drops it.
        unsafe {
            *slot_ptr(self.state.as_ptr(), stream) = callback;
            (*context_field(self.state.as_ptr())).set_callback(stream, trampoline);
        }
    }

    /// Route `stream` to a raw C callback instead of a closure
    ///
    /// The callback receives [`context_ptr`](Self::context_ptr) as its
    /// context argument.
    pub fn set_raw_callback(&mut self, stream: Stream, callback: RawCallback<C>) {
        // SAFETY: as in `set_callback`
        unsafe {
            *slot_ptr(self.state.as_ptr(), stream) = None;
            (*context_field(self.state.as_ptr())).set_callback(stream, Some(callback));
        }
    }

    pub fn clear_print(&mut self) {
        self.set_callback(Stream::Print, None);
    }

    pub fn clear_error(&mut self) {
        self.set_callback(Stream::Error, None);
    }

    /// Check if diagnostics on `stream` reach the host
    pub fn is_configured(&self, stream: Stream) -> bool {
        unsafe { (*context_field(self.state.as_ptr())).is_configured(stream) }
    }

    /// Stable address of the context, the value stored in the foreign slot
    pub fn context_ptr(&self) -> *mut HostContext<C> {
        self.state.as_ptr() as *mut HostContext<C>
    }

    /// Store this relay's context in `vm`'s foreign slot
    ///
    /// Fails if the slot already holds a different pointer. The relay must
    /// outlive the attachment; call [`detach`](Self::detach) or drop the VM
    /// first.
    pub fn attach<V>(&self, vm: &mut V) -> Result<()>
    where
        V: ForeignSlot<Char = C> + ?Sized,
    {
        let current = vm.foreign_ptr();
        let ours = self.context_ptr().cast();
        if !current.is_null() && current != ours {
            return Err(RelayError::SlotOccupied);
        }
        vm.set_foreign_ptr(ours);
        log::debug!("Host relay attached at {:p}", ours);
        Ok(())
    }

    /// Clear `vm`'s foreign slot if it points at this relay
    pub fn detach<V>(&self, vm: &mut V) -> bool
    where
        V: ForeignSlot<Char = C> + ?Sized,
    {
        if vm.foreign_ptr() == self.context_ptr().cast() {
            vm.set_foreign_ptr(std::ptr::null_mut());
            log::debug!("Host relay detached from {:p}", self.context_ptr());
            true
        } else {
            false
        }
    }
}

impl<C: NativeChar> Default for HostRelay<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: NativeChar> Drop for HostRelay<C> {
    fn drop(&mut self) {
        // SAFETY: allocated by Box in `silent` and owned by this handle
        drop(unsafe { Box::from_raw(self.state.as_ptr()) });
    }
}

fn trampoline_for<C: NativeChar>(stream: Stream) -> RawCallback<C> {
    match stream {
        Stream::Print => print_trampoline::<C>,
        Stream::Error => error_trampoline::<C>,
    }
}

unsafe extern "C" fn print_trampoline<C: NativeChar>(context: *mut HostContext<C>, message: *const C) {
    dispatch(context, Stream::Print, message)
}

unsafe extern "C" fn error_trampoline<C: NativeChar>(context: *mut HostContext<C>, message: *const C) {
    dispatch(context, Stream::Error, message)
}

/// Run the closure for `stream` with the decoded message.
///
/// The closure is taken out of its slot for the duration of the call, so a
/// diagnostic raised from inside it finds no handler and is dropped instead
/// of aliasing the running closure. Panics are contained here; they must not
/// unwind into the VM.
unsafe fn dispatch<C: NativeChar>(context: *mut HostContext<C>, stream: Stream, message: *const C) {
    let state = context as *mut RelayState<C>;
    let slot = slot_ptr(state, stream);

    let mut callback = match (*slot).take() {
        Some(callback) => callback,
        None => {
            log::trace!("Re-entrant {} diagnostic dropped", stream);
            return;
        }
    };

    let text = string_from_native(message);
    if panic::catch_unwind(AssertUnwindSafe(|| callback(&text))).is_err() {
        log::error!("Host {} callback panicked; diagnostic dropped", stream);
    }

    // Keep a replacement installed from inside the callback, and stay
    // cleared if the callback cleared its stream
    if (*slot).is_none() && (*context_field(state)).is_configured(stream) {
        *slot = Some(callback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SinkKind;
    use crate::relay::{relay_error, relay_print};
    use std::cell::RefCell;
    use std::ffi::c_void;
    use std::rc::Rc;

    struct TestVm {
        foreign: *mut c_void,
    }

    impl TestVm {
        fn new() -> Self {
            Self {
                foreign: std::ptr::null_mut(),
            }
        }
    }

    impl ForeignSlot for TestVm {
        type Char = u16;

        fn foreign_ptr(&self) -> *mut c_void {
            self.foreign
        }

        fn set_foreign_ptr(&mut self, ptr: *mut c_void) {
            self.foreign = ptr;
        }
    }

    fn capture() -> (Rc<RefCell<Vec<String>>>, impl FnMut(&str) + 'static) {
        let lines = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&lines);
        (lines, move |message: &str| sink.borrow_mut().push(message.to_string()))
    }

    #[test]
    fn test_closures_receive_decoded_messages() {
        let (printed, on_print) = capture();
        let (errors, on_error) = capture();
        let relay = HostRelay::<u16>::silent()
            .with_print(on_print)
            .with_error(on_error);

        let mut vm = TestVm::new();
        relay.attach(&mut vm).unwrap();

        unsafe {
            relay_print(&vm, format_args!("{} ünïcode", 42));
            relay_error(&vm, format_args!("line {}", 7));
        }

        assert_eq!(*printed.borrow(), vec!["42 ünïcode".to_string()]);
        assert_eq!(*errors.borrow(), vec!["line 7".to_string()]);
    }

    #[test]
    fn test_cleared_stream_is_dropped() {
        let (printed, on_print) = capture();
        let mut relay = HostRelay::<u16>::silent().with_print(on_print);
        relay.clear_error();
        assert!(relay.is_configured(Stream::Print));
        assert!(!relay.is_configured(Stream::Error));

        let mut vm = TestVm::new();
        relay.attach(&mut vm).unwrap();
        unsafe {
            relay_error(&vm, format_args!("ignored"));
            relay_print(&vm, format_args!("kept"));
        }
        assert_eq!(*printed.borrow(), vec!["kept".to_string()]);

        relay.clear_print();
        unsafe { relay_print(&vm, format_args!("ignored too")) };
        assert_eq!(printed.borrow().len(), 1);
    }

    #[test]
    fn test_attach_refuses_occupied_slot() {
        let first = HostRelay::<u16>::silent();
        let second = HostRelay::<u16>::silent();
        let mut vm = TestVm::new();

        first.attach(&mut vm).unwrap();
        // Re-attaching the same relay is fine
        first.attach(&mut vm).unwrap();
        assert!(matches!(second.attach(&mut vm), Err(RelayError::SlotOccupied)));

        assert!(!second.detach(&mut vm));
        assert!(first.detach(&mut vm));
        assert!(vm.foreign_ptr().is_null());
        second.attach(&mut vm).unwrap();
    }

    #[test]
    fn test_panicking_callback_is_contained() {
        let relay = HostRelay::<u16>::silent().with_print(|_| panic!("host bug"));
        let mut vm = TestVm::new();
        relay.attach(&mut vm).unwrap();

        unsafe { relay_print(&vm, format_args!("boom")) };
        // The closure survives and is still installed
        assert!(relay.is_configured(Stream::Print));
    }

    #[test]
    fn test_reentrant_diagnostic_is_dropped() {
        let mut vm = Box::new(TestVm::new());
        let mut relay = HostRelay::<u16>::silent();
        relay.attach(&mut *vm).unwrap();

        let vm_ptr: *const TestVm = &*vm;
        let (printed, mut on_print) = capture();
        relay.set_callback(
            Stream::Print,
            Some(Box::new(move |message: &str| {
                on_print(message);
                // Same stream from inside the handler
                unsafe { relay_print(&*vm_ptr, format_args!("nested")) };
            })),
        );

        unsafe { relay_print(&*vm, format_args!("outer")) };
        assert_eq!(*printed.borrow(), vec!["outer".to_string()]);
        assert!(relay.is_configured(Stream::Print));
    }

    #[test]
    fn test_error_raised_from_print_closure() {
        let mut vm = Box::new(TestVm::new());
        let (errors, on_error) = capture();
        let mut relay = HostRelay::<u16>::silent().with_error(on_error);
        relay.attach(&mut *vm).unwrap();

        let vm_ptr: *const TestVm = &*vm;
        let (printed, mut on_print) = capture();
        relay.set_callback(
            Stream::Print,
            Some(Box::new(move |message: &str| {
                on_print(message);
                unsafe { relay_error(&*vm_ptr, format_args!("while printing {}", message)) };
            })),
        );

        unsafe {
            relay_print(&*vm, format_args!("a"));
            relay_print(&*vm, format_args!("b"));
        }
        assert_eq!(*printed.borrow(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(
            *errors.borrow(),
            vec!["while printing a".to_string(), "while printing b".to_string()]
        );
    }

    #[test]
    fn test_closure_can_replace_itself() {
        let mut vm = Box::new(TestVm::new());
        let relay: *mut HostRelay<u16> = Box::into_raw(Box::new(HostRelay::silent()));
        let lines = Rc::new(RefCell::new(Vec::new()));

        unsafe {
            (*relay).attach(&mut *vm).unwrap();
            let first = Rc::clone(&lines);
            let second = Rc::clone(&lines);
            (*relay).set_callback(
                Stream::Print,
                Some(Box::new(move |message: &str| {
                    first.borrow_mut().push(format!("first {}", message));
                    let second = Rc::clone(&second);
                    (*relay).set_callback(
                        Stream::Print,
                        Some(Box::new(move |message: &str| {
                            second.borrow_mut().push(format!("second {}", message))
                        })),
                    );
                })),
            );

            relay_print(&*vm, format_args!("x"));
            relay_print(&*vm, format_args!("y"));
            drop(Box::from_raw(relay));
        }

        assert_eq!(*lines.borrow(), vec!["first x".to_string(), "second y".to_string()]);
    }

    #[test]
    fn test_closure_can_clear_its_stream() {
        let mut vm = Box::new(TestVm::new());
        let relay: *mut HostRelay<u16> = Box::into_raw(Box::new(HostRelay::silent()));
        let (printed, mut on_print) = capture();

        unsafe {
            (*relay).attach(&mut *vm).unwrap();
            (*relay).set_callback(
                Stream::Print,
                Some(Box::new(move |message: &str| {
                    on_print(message);
                    (*relay).clear_print();
                })),
            );

            relay_print(&*vm, format_args!("once"));
            relay_print(&*vm, format_args!("never"));
            assert!(!(*relay).is_configured(Stream::Print));
            drop(Box::from_raw(relay));
        }

        assert_eq!(*printed.borrow(), vec!["once".to_string()]);
    }

    #[test]
    fn test_new_prints_to_terminal() {
        let relay = HostRelay::<u8>::new();
        assert!(relay.is_configured(Stream::Print));
        assert!(relay.is_configured(Stream::Error));
    }

    #[test]
    fn test_from_config_discard() {
        let config = RelayConfig::new()
            .with_print(SinkKind::Discard)
            .with_error(SinkKind::Log);
        let relay = HostRelay::<u8>::from_config(&config);
        assert!(!relay.is_configured(Stream::Print));
        assert!(relay.is_configured(Stream::Error));
    }

    #[test]
    fn test_raw_callback_replaces_closure() {
        unsafe extern "C" fn raw(_context: *mut HostContext<u16>, _message: *const u16) {}

        let mut relay = HostRelay::<u16>::new();
        relay.set_raw_callback(Stream::Error, raw);
        assert!(relay.is_configured(Stream::Error));

        let context = unsafe { &*relay.context_ptr() };
        assert_eq!(
            context.error_callback.map(|f| f as usize),
            Some(raw as RawCallback<u16> as usize)
        );
    }
}
