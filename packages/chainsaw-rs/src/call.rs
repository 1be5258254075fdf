//! Queued calls and their type-erased argument lists.
//!
//! Arguments cross the chain boundary as `Rc<dyn Any>` so a single harness can
//! take integers, strings and callbacks side by side. Handlers read them back
//! with [`Args::get`], which reports the stored type name on mismatch.

use std::any::{type_name, Any};
use std::fmt;
use std::rc::Rc;

use crate::error::ChainsawError;

/// One type-erased argument.
#[derive(Clone)]
pub struct Arg {
    value: Rc<dyn Any>,
    type_name: &'static str,
}

impl Arg {
    /// Wrap a value.
    pub fn new<T: 'static>(value: T) -> Self {
        Self {
            value: Rc::new(value),
            type_name: type_name::<T>(),
        }
    }

    /// Name of the stored Rust type.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Borrow the value if it has type `T`.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name)
    }
}

/// Ordered argument list of a call or signal.
#[derive(Clone, Default)]
pub struct Args {
    items: Vec<Arg>,
}

impl Args {
    /// Empty argument list.
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Append a value.
    pub fn push<T: 'static>(&mut self, value: T) {
        self.items.push(Arg::new(value));
    }

    /// Append a value, builder style.
    pub fn with<T: 'static>(mut self, value: T) -> Self {
        self.push(value);
        self
    }

    /// Append every argument of `other`.
    pub fn extend(&mut self, other: Args) {
        self.items.extend(other.items);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Typed access to argument `index`.
    pub fn get<T: 'static>(&self, index: usize) -> Result<&T, ChainsawError> {
        let arg = self
            .items
            .get(index)
            .ok_or(ChainsawError::MissingArgument {
                index,
                len: self.items.len(),
            })?;
        arg.downcast_ref::<T>()
            .ok_or_else(|| ChainsawError::ArgumentType {
                index,
                expected: type_name::<T>(),
                found: arg.type_name,
            })
    }

    /// Like [`Args::get`] but `None` on any mismatch.
    pub fn try_get<T: 'static>(&self, index: usize) -> Option<&T> {
        self.items.get(index).and_then(|a| a.downcast_ref::<T>())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arg> {
        self.items.iter()
    }
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.items.iter()).finish()
    }
}

impl FromIterator<Arg> for Args {
    fn from_iter<I: IntoIterator<Item = Arg>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

/// Conversion into an argument list.
///
/// Implemented for `Args`, `()` and tuples of up to six `'static` values, so
/// `chain.call("x", (1_i64,))` and `chain.call("end", ())` both work.
pub trait IntoArgs {
    fn into_args(self) -> Args;
}

impl IntoArgs for Args {
    fn into_args(self) -> Args {
        self
    }
}

impl IntoArgs for () {
    fn into_args(self) -> Args {
        Args::new()
    }
}

macro_rules! tuple_into_args {
    ($($name:ident),+) => {
        impl<$($name: 'static),+> IntoArgs for ($($name,)+) {
            #[allow(non_snake_case)]
            fn into_args(self) -> Args {
                let ($($name,)+) = self;
                let mut args = Args::new();
                $(args.push($name);)+
                args
            }
        }
    };
}

tuple_into_args!(A);
tuple_into_args!(A, B);
tuple_into_args!(A, B, C);
tuple_into_args!(A, B, C, D);
tuple_into_args!(A, B, C, D, E);
tuple_into_args!(A, B, C, D, E, F);

/// An operation and its arguments, queued on a frame.
///
/// Immutable once enqueued. `path` holds the harness segments the call was
/// made through (group names, then the operation); `name` is those segments
/// joined with `.` and is what signals match against.
#[derive(Clone)]
pub struct QueuedCall {
    name: String,
    path: Vec<String>,
    args: Args,
}

impl QueuedCall {
    pub(crate) fn from_path(path: Vec<String>, args: Args) -> Self {
        Self {
            name: path.join("."),
            path,
            args,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn args(&self) -> &Args {
        &self.args
    }
}

impl fmt::Debug for QueuedCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedCall")
            .field("name", &self.name)
            .field("args", &self.args)
            .finish()
    }
}
