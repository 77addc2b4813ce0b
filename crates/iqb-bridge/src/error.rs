//! Last-error store shared by all bridge entry points
//!
//! Kept per thread, like `errno`: a host reading the message after a failed
//! call on one thread never sees another thread's failure.

use std::cell::RefCell;

use iqb_core::IqbError;

thread_local! {
    static LAST_ERROR: RefCell<Option<String>> = const { RefCell::new(None) };
}

pub(crate) fn set_error(context: &str, err: &IqbError) {
    let message = format!("{context}: {err}");
    log::error!("{message}");
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(message));
}

pub(crate) fn clear_error() {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = None);
}

pub(crate) fn last_error() -> Option<String> {
    LAST_ERROR.with(|slot| slot.borrow().clone())
}
