//! Handler descriptors and typed invocation.
//!
//! # Responsibilities
//! - Turn typed handler functions into uniform descriptors at registration
//! - Coerce positional path arguments into the declared parameter types
//! - Reject calls whose argument count does not match the handler
//!
//! # Design Decisions
//! - The request context is always the first parameter and is not counted
//! - Coercion is written once per primitive type via [`FromSegment`]
//! - An argument that fails to parse becomes the type's zero value and is logged

use std::fmt;
use std::sync::Arc;

use crate::http::context::RequestContext;

/// Declared type of a positional handler parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Int,
    Int64,
    Float64,
    String,
}

impl ParamKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ParamKind::Int => "int",
            ParamKind::Int64 => "int64",
            ParamKind::Float64 => "float64",
            ParamKind::String => "string",
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A type that can be parsed from one path segment.
///
/// Implemented for `i32`, `i64`, `f64` and `String` only, which keeps handler
/// signatures restricted to those parameter types.
pub trait FromSegment: Default + Sized {
    const KIND: ParamKind;

    /// Parse the segment, `None` when it is not a valid value.
    fn from_segment(raw: &str) -> Option<Self>;
}

impl FromSegment for i32 {
    const KIND: ParamKind = ParamKind::Int;

    fn from_segment(raw: &str) -> Option<Self> {
        raw.parse().ok()
    }
}

impl FromSegment for i64 {
    const KIND: ParamKind = ParamKind::Int64;

    fn from_segment(raw: &str) -> Option<Self> {
        raw.parse().ok()
    }
}

impl FromSegment for f64 {
    const KIND: ParamKind = ParamKind::Float64;

    fn from_segment(raw: &str) -> Option<Self> {
        raw.parse().ok()
    }
}

impl FromSegment for String {
    const KIND: ParamKind = ParamKind::String;

    fn from_segment(raw: &str) -> Option<Self> {
        Some(raw.to_string())
    }
}

/// Argument coercion used by the generated invokers.
fn coerce<T: FromSegment>(handler: &str, index: usize, raw: &str) -> T {
    match T::from_segment(raw) {
        Some(value) => value,
        None => {
            tracing::warn!(
                handler = %handler,
                index,
                kind = %T::KIND,
                value = %raw,
                "Path argument did not parse, using zero value"
            );
            T::default()
        }
    }
}

/// Errors raised when calling a handler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvokeError {
    #[error("{handler} expects {expected} argument(s), got {got}")]
    Arity {
        handler: String,
        expected: usize,
        got: usize,
    },
}

type InvokeFn = dyn Fn(&mut RequestContext, &[String]) + Send + Sync;

/// A resolved, callable handler. Holds no per-request state.
#[derive(Clone)]
pub struct HandlerDescriptor {
    qualified_name: String,
    param_kinds: Vec<ParamKind>,
    invoke: Arc<InvokeFn>,
}

impl HandlerDescriptor {
    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    pub fn param_kinds(&self) -> &[ParamKind] {
        &self.param_kinds
    }

    /// Call the handler with positional string arguments.
    pub fn call(&self, ctx: &mut RequestContext, args: &[String]) -> Result<(), InvokeError> {
        if args.len() != self.param_kinds.len() {
            return Err(InvokeError::Arity {
                handler: self.qualified_name.clone(),
                expected: self.param_kinds.len(),
                got: args.len(),
            });
        }
        (self.invoke)(ctx, args);
        Ok(())
    }
}

impl fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("qualified_name", &self.qualified_name)
            .field("param_kinds", &self.param_kinds)
            .finish_non_exhaustive()
    }
}

/// Functions usable as route handlers.
///
/// Implemented for `Fn(&mut RequestContext, A1, .., An)` with up to four
/// [`FromSegment`] parameters. `Args` only disambiguates the impls.
pub trait Handler<Args>: Send + Sync + 'static {
    fn into_descriptor(self, qualified_name: String) -> HandlerDescriptor;
}

impl<F> Handler<()> for F
where
    F: Fn(&mut RequestContext) + Send + Sync + 'static,
{
    fn into_descriptor(self, qualified_name: String) -> HandlerDescriptor {
        HandlerDescriptor {
            qualified_name,
            param_kinds: Vec::new(),
            invoke: Arc::new(move |ctx: &mut RequestContext, _args: &[String]| self(ctx)),
        }
    }
}

macro_rules! impl_handler {
    ($($ty:ident => $idx:tt),+) => {
        impl<F, $($ty,)+> Handler<($($ty,)+)> for F
        where
            F: Fn(&mut RequestContext, $($ty,)+) + Send + Sync + 'static,
            $($ty: FromSegment + 'static,)+
        {
            fn into_descriptor(self, qualified_name: String) -> HandlerDescriptor {
                let name = qualified_name.clone();
                HandlerDescriptor {
                    qualified_name,
                    param_kinds: vec![$($ty::KIND,)+],
                    invoke: Arc::new(move |ctx: &mut RequestContext, args: &[String]| {
                        self(ctx, $(coerce::<$ty>(&name, $idx, &args[$idx]),)+)
                    }),
                }
            }
        }
    };
}

impl_handler!(A1 => 0);
impl_handler!(A1 => 0, A2 => 1);
impl_handler!(A1 => 0, A2 => 1, A3 => 2);
impl_handler!(A1 => 0, A2 => 1, A3 => 2, A4 => 3);
