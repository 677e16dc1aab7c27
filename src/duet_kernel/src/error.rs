//! Result codes and per-operation error types.
//!
//! Every fallible operation has its own narrow error type whose variants are
//! drawn from [`ResultCode`]. This keeps the set of failures an operation can
//! actually report visible in its signature while still allowing callers to
//! funnel everything into one code (e.g., to pass across a C boundary).
use core::fmt;

/// The macro to define [`ResultCode`].
macro_rules! define_result_code {
    (
        $( #[$meta:meta] )*
        pub enum ResultCode {
            $(
                $( #[$vmeta:meta] )*
                $vname:ident = $vd:expr
            ),* $(,)*
        }
    ) => {
        $( #[$meta] )*
        pub enum ResultCode {
            $(
                $( #[$vmeta] )*
                $vname = $vd
            ),*
        }

        impl ResultCode {
            /// Get the short name of the result code.
            ///
            /// # Examples
            ///
            /// ```
            /// use duet_kernel::ResultCode;
            /// assert_eq!(ResultCode::BadObjectState.as_str(), "BadObjectState");
            /// ```
            pub fn as_str(self) -> &'static str {
                match self {
                    $(
                        Self::$vname => stringify!($vname),
                    )*
                }
            }

            /// Determine if this result code represents a failure.
            #[inline]
            pub fn is_err(self) -> bool {
                (self as i8) < 0
            }
        }

        impl fmt::Debug for ResultCode {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl fmt::Display for ResultCode {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

define_result_code! {
    /// All result codes (including success) that the messaging core and the
    /// scheduler can return.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    #[repr(i8)]
    pub enum ResultCode {
        /// The operation was successful.
        Success = 0,
        /// The operation is not supported on this core.
        NotSupported = -9,
        /// A parameter is invalid: a channel number out of range, a data
        /// block that is too large, an address outside the shared window, a
        /// malformed stack specification, and so on.
        BadParam = -17,
        /// The specified task handle does not name a task in the task list.
        BadId = -18,
        /// The current context disallows the operation, e.g., a task tried to
        /// delete itself, or a blocking call was made from outside a cothread.
        BadContext = -25,
        /// The object is in a state that does not permit the operation, e.g.,
        /// the exit code of a task that hasn't finished yet was requested.
        BadObjectState = -41,
        /// There is no pending message of the requested kind.
        QueueEmpty = -43,
    }
}

macro_rules! define_error {
    (
        $( #[doc $( $doc:tt )*] )*
        pub enum $Name:ident {
            $(
                $( #[doc $( $vdoc:tt )*] )*
                $Variant:ident,
            )*
        }
    ) => {
        $( #[doc $( $doc )*] )*
        #[repr(i8)]
        #[derive(PartialEq, Eq, Copy, Clone, Hash)]
        pub enum $Name {
            $(
                $( #[doc $( $vdoc )*] )*
                $Variant = ResultCode::$Variant as _,
            )*
        }

        impl From<$Name> for ResultCode {
            #[inline]
            fn from(x: $Name) -> Self {
                match x {
                    $( $Name::$Variant => Self::$Variant ),*
                }
            }
        }

        impl fmt::Debug for $Name {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                ResultCode::from(*self).fmt(f)
            }
        }

        impl fmt::Display for $Name {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                fmt::Display::fmt(&ResultCode::from(*self), f)
            }
        }
    };
}

define_error! {
    /// Error type of [`Channel::new`](crate::Channel::new).
    pub enum ChannelError {
        /// The channel number is not in `0..NUM_CHANNELS`.
        BadParam,
    }
}

define_error! {
    /// Error type of the task creation operation.
    pub enum SpawnError {
        /// The stack specification is invalid (zero-sized, not a multiple of
        /// the word size, or smaller than the minimum).
        BadParam,
        /// The host was unable to create the backing execution context.
        NotSupported,
    }
}

define_error! {
    /// Error type of the task deletion operation.
    pub enum DeleteTaskError {
        /// The handle does not name a task in the task list.
        BadId,
        /// The task is the one currently running.
        BadContext,
        /// The task is the main task, which can never be destroyed.
        BadObjectState,
    }
}

define_error! {
    /// Error type of the detach and join-query operations.
    pub enum JoinTaskError {
        /// The handle does not name a task in the task list.
        BadId,
        /// The task is already detached, or is the main task.
        BadObjectState,
    }
}

define_error! {
    /// Error type of the exit-code query.
    pub enum GetExitCodeError {
        /// The handle does not name a task in the task list.
        BadId,
        /// The task has not finished yet.
        BadObjectState,
    }
}

define_error! {
    /// Error type of the blocking operations (`yield_until`, blocking
    /// receives, pool waits).
    pub enum WaitError {
        /// The caller is not a cothread of this core.
        BadContext,
        /// The requested interrupt bank doesn't exist on this core.
        NotSupported,
    }
}

define_error! {
    /// Error type of the send operations.
    pub enum SendError {
        /// The data block is larger than [`MAX_DATA_BYTES`], or the address
        /// is outside the shared window.
        ///
        /// [`MAX_DATA_BYTES`]: crate::cfg::MAX_DATA_BYTES
        BadParam,
        /// The sending task would have to block for buffer space, but the
        /// caller is not a cothread of this core.
        BadContext,
        /// The core has accepted a reset request and sends nothing until it's
        /// run again.
        BadObjectState,
    }
}

impl From<WaitError> for SendError {
    #[inline]
    fn from(x: WaitError) -> Self {
        match x {
            WaitError::BadContext | WaitError::NotSupported => Self::BadContext,
        }
    }
}

define_error! {
    /// Error type of the polling receive operations.
    pub enum RecvError {
        /// There is no pending message of the requested kind on the channel.
        QueueEmpty,
    }
}

define_error! {
    /// Error type of the reset request operation.
    pub enum ResetError {
        /// The caller is not a cothread of this core.
        BadContext,
    }
}

impl From<WaitError> for ResetError {
    #[inline]
    fn from(_: WaitError) -> Self {
        Self::BadContext
    }
}

impl From<SendError> for ResetError {
    #[inline]
    fn from(_: SendError) -> Self {
        Self::BadContext
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suberror_codes_match_result_codes() {
        assert_eq!(
            SpawnError::BadParam as i8,
            ResultCode::BadParam as i8,
        );
        assert_eq!(
            ResultCode::from(DeleteTaskError::BadContext),
            ResultCode::BadContext
        );
        assert_eq!(
            ResultCode::from(RecvError::QueueEmpty),
            ResultCode::QueueEmpty
        );
        assert!(ResultCode::from(GetExitCodeError::BadObjectState).is_err());
        assert!(!ResultCode::Success.is_err());
    }

    #[test]
    fn debug_prints_short_name() {
        assert_eq!(format!("{:?}", SendError::BadParam), "BadParam");
        assert_eq!(format!("{}", JoinTaskError::BadId), "BadId");
    }

    #[test]
    fn wait_error_converts_to_send_error() {
        assert_eq!(SendError::from(WaitError::BadContext), SendError::BadContext);
        assert_eq!(
            ResultCode::from(SendError::BadObjectState),
            ResultCode::BadObjectState
        );
    }
}
