//! Declared signatures of the registered functions and their compatibility check.
//!
//! An algorithm is registered as three functions over an instance type `I` and a
//! solution type `S`:
//!
//! - compute: `(I) -> S`
//! - feasibility: `(I, S) -> bool`
//! - scoring: `(I, S) -> number`
//!
//! The types are described with [`TypeDescriptor`]s gathered into a [`Signature`], either
//! derived from the generic parameters of the registered closures or declared with the
//! [`SignatureBuilder`]. [`validate`] then checks the three signatures against each
//! other once, before anything is uploaded.
//!
//! # Example
//!
//! ```
//! use algobench::signature::{validate, Signature};
//!
//! let compute = Signature::builder("solve")
//!     .source("knapsack")
//!     .param::<Vec<u32>>()
//!     .returns::<Vec<usize>>()
//!     .build();
//! let feasibility = Signature::builder("check")
//!     .source("knapsack")
//!     .param::<Vec<u32>>()
//!     .param::<Vec<usize>>()
//!     .returns::<bool>()
//!     .build();
//! let scoring = Signature::builder("value")
//!     .source("knapsack")
//!     .param::<Vec<u32>>()
//!     .param::<Vec<usize>>()
//!     .returns::<f64>()
//!     .build();
//!
//! assert!(validate(&compute, &feasibility, &scoring).is_ok());
//! ```

use std::{
    any::{type_name, TypeId},
    fmt,
};

use thiserror::Error;
use tracing::warn;

/// Coarse classification of a type, enough to check return types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    /// `bool`
    Bool,
    /// Any primitive integer.
    Integer,
    /// `f32` or `f64`.
    Float,
    /// Everything else.
    Other,
}

impl TypeKind {
    /// True for integers and floats.
    pub fn is_numeric(&self) -> bool {
        matches!(self, TypeKind::Integer | TypeKind::Float)
    }

    fn of<T: 'static>() -> Self {
        let id = TypeId::of::<T>();
        let integers = [
            TypeId::of::<i8>(),
            TypeId::of::<i16>(),
            TypeId::of::<i32>(),
            TypeId::of::<i64>(),
            TypeId::of::<i128>(),
            TypeId::of::<isize>(),
            TypeId::of::<u8>(),
            TypeId::of::<u16>(),
            TypeId::of::<u32>(),
            TypeId::of::<u64>(),
            TypeId::of::<u128>(),
            TypeId::of::<usize>(),
        ];

        if id == TypeId::of::<bool>() {
            TypeKind::Bool
        } else if id == TypeId::of::<f32>() || id == TypeId::of::<f64>() {
            TypeKind::Float
        } else if integers.contains(&id) {
            TypeKind::Integer
        } else {
            TypeKind::Other
        }
    }
}

/// Identity of a parameter or return type.
///
/// Two descriptors are equal when they describe the same Rust type.
#[derive(Debug, Clone, Copy)]
pub struct TypeDescriptor {
    id: TypeId,
    name: &'static str,
    kind: TypeKind,
}

impl TypeDescriptor {
    /// Describes `T`.
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
            kind: TypeKind::of::<T>(),
        }
    }

    /// Full type name, for diagnostics only.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Classification of the type.
    pub fn kind(&self) -> TypeKind {
        self.kind
    }
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeDescriptor {}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Declared shape of one registered function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    name: String,
    source: String,
    params: Vec<TypeDescriptor>,
    returns: TypeDescriptor,
}

impl Signature {
    /// Starts the declaration of a function named `name`.
    pub fn builder(name: impl Into<String>) -> SignatureBuilder {
        SignatureBuilder::new(name)
    }

    /// Signature of a compute closure `F: Fn(&I) -> S`.
    pub fn compute<F, I, S>() -> Self
    where
        F: Fn(&I) -> S,
        I: 'static,
        S: 'static,
    {
        Self::derived::<F>(vec![TypeDescriptor::of::<I>()], TypeDescriptor::of::<S>())
    }

    /// Signature of a feasibility closure `F: Fn(&I, &S) -> bool`.
    pub fn feasibility<F, I, S>() -> Self
    where
        F: Fn(&I, &S) -> bool,
        I: 'static,
        S: 'static,
    {
        Self::derived::<F>(
            vec![TypeDescriptor::of::<I>(), TypeDescriptor::of::<S>()],
            TypeDescriptor::of::<bool>(),
        )
    }

    /// Signature of a scoring closure `F: Fn(&I, &S) -> Sc`.
    pub fn scoring<F, I, S, Sc>() -> Self
    where
        F: Fn(&I, &S) -> Sc,
        I: 'static,
        S: 'static,
        Sc: 'static,
    {
        Self::derived::<F>(
            vec![TypeDescriptor::of::<I>(), TypeDescriptor::of::<S>()],
            TypeDescriptor::of::<Sc>(),
        )
    }

    fn derived<F>(params: Vec<TypeDescriptor>, returns: TypeDescriptor) -> Self {
        let name = type_name::<F>();
        Self {
            name: name.to_owned(),
            source: source_unit(name),
            params,
            returns,
        }
    }

    /// Function name as registered with the server.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registration unit the function was declared in.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Parameter types, in order.
    pub fn params(&self) -> &[TypeDescriptor] {
        &self.params
    }

    /// Return type.
    pub fn returns(&self) -> TypeDescriptor {
        self.returns
    }
}

/// Module path of a function path: `my_crate::solver::solve` lives in `my_crate::solver`.
///
/// Closures belong to the module of their enclosing function, and methods and closures
/// written in an `impl` block belong to the module of the type:
/// `my_crate::solver::Runner::run::{{closure}}` lives in `my_crate::solver`.
fn source_unit(path: &str) -> String {
    let path = without_generics(&qualified_self(path));
    let mut segments: Vec<&str> = path.split("::").filter(|s| !s.is_empty()).collect();
    if segments.len() <= 1 {
        return segments.concat();
    }

    while segments.last() == Some(&"{{closure}}") {
        segments.pop();
    }
    // the function itself, then the impl types it was declared on
    segments.pop();
    while segments.len() > 1
        && segments
            .last()
            .is_some_and(|s| s.starts_with(|c: char| c.is_ascii_uppercase()))
    {
        segments.pop();
    }
    segments.join("::")
}

/// `<my_crate::Runner as my_crate::Solve>::run` becomes `my_crate::Runner::run`.
fn qualified_self(path: &str) -> String {
    let Some(inner) = path.strip_prefix('<') else {
        return path.to_owned();
    };
    let mut depth = 1;
    for (i, c) in inner.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth -= 1,
            _ => {}
        }
        if depth == 0 {
            let self_type = inner[..i].split(" as ").next().unwrap_or(&inner[..i]);
            return format!("{self_type}{}", &inner[i + 1..]);
        }
    }
    path.to_owned()
}

fn without_generics(path: &str) -> String {
    let mut depth = 0_usize;
    path.chars()
        .filter(|&c| match c {
            '<' => {
                depth += 1;
                false
            }
            '>' => {
                depth = depth.saturating_sub(1);
                false
            }
            _ => depth == 0,
        })
        .collect()
}

/// Builder declaring a [`Signature`] by hand.
///
/// Used when the registered functions cannot be inspected through their generic types, or
/// to state the registration unit explicitly.
#[derive(Debug)]
pub struct SignatureBuilder {
    name: String,
    source: Option<String>,
    params: Vec<TypeDescriptor>,
    returns: Option<TypeDescriptor>,
}

impl SignatureBuilder {
    /// New declaration without parameters, returning `()`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: None,
            params: vec![],
            returns: None,
        }
    }

    /// Sets the registration unit. Defaults to the empty unit.
    #[must_use]
    pub fn source(self, source: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            ..self
        }
    }

    /// Appends a parameter of type `T`.
    #[must_use]
    pub fn param<T: 'static>(mut self) -> Self {
        self.params.push(TypeDescriptor::of::<T>());
        self
    }

    /// Sets the return type.
    #[must_use]
    pub fn returns<T: 'static>(self) -> Self {
        Self {
            returns: Some(TypeDescriptor::of::<T>()),
            ..self
        }
    }

    /// Consumes the builder.
    pub fn build(self) -> Signature {
        Signature {
            name: self.name,
            source: self.source.unwrap_or_default(),
            params: self.params,
            returns: self.returns.unwrap_or_else(TypeDescriptor::of::<()>),
        }
    }
}

/// The first incompatibility found between the three signatures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    /// A function declares the wrong number of parameters.
    #[error("{function} must take {expected} parameter(s), found {found}")]
    Arity {
        /// Offending function.
        function: String,
        /// Required parameter count.
        expected: usize,
        /// Declared parameter count.
        found: usize,
    },
    /// A parameter type does not match the compute function's types.
    #[error("parameter {position} of {function} must be {expected}, found {found}")]
    Parameter {
        /// Offending function.
        function: String,
        /// Zero-based position.
        position: usize,
        /// Name of the type required by compute.
        expected: &'static str,
        /// Name of the declared type.
        found: &'static str,
    },
    /// The feasibility function does not return `bool`.
    #[error("{function} must return bool, found {found}")]
    NotBoolean {
        /// Offending function.
        function: String,
        /// Declared return type.
        found: &'static str,
    },
    /// The scoring function does not return a number.
    #[error("{function} must return an integer or a float, found {found}")]
    NotNumeric {
        /// Offending function.
        function: String,
        /// Declared return type.
        found: &'static str,
    },
    /// The functions were declared in different registration units.
    #[error("algorithm, feasibility and scoring must be in the same source unit (found {compute}, {feasibility}, {scoring})")]
    SourceMismatch {
        /// Unit of compute.
        compute: String,
        /// Unit of feasibility.
        feasibility: String,
        /// Unit of scoring.
        scoring: String,
    },
}

/// Checks that `feasibility` and `scoring` accept `(I, S)` where `compute: I -> S`, that
/// they return `bool` and a number, and that all three share a registration unit.
pub fn validate(
    compute: &Signature,
    feasibility: &Signature,
    scoring: &Signature,
) -> Result<(), SignatureError> {
    check_arity(compute, 1)?;
    check_arity(feasibility, 2)?;
    check_arity(scoring, 2)?;

    let expected = [compute.params[0], compute.returns];
    for signature in [feasibility, scoring] {
        for (position, (declared, required)) in
            signature.params.iter().zip(expected.iter()).enumerate()
        {
            if declared != required {
                return Err(SignatureError::Parameter {
                    function: signature.name.clone(),
                    position,
                    expected: required.name,
                    found: declared.name,
                });
            }
        }
    }

    if feasibility.returns.kind != TypeKind::Bool {
        return Err(SignatureError::NotBoolean {
            function: feasibility.name.clone(),
            found: feasibility.returns.name,
        });
    }

    if !scoring.returns.kind.is_numeric() {
        return Err(SignatureError::NotNumeric {
            function: scoring.name.clone(),
            found: scoring.returns.name,
        });
    }

    if compute.source != feasibility.source || compute.source != scoring.source {
        return Err(SignatureError::SourceMismatch {
            compute: compute.source.clone(),
            feasibility: feasibility.source.clone(),
            scoring: scoring.source.clone(),
        });
    }

    Ok(())
}

/// Boolean form of [`validate`]; the mismatch, if any, is logged.
pub fn is_valid(compute: &Signature, feasibility: &Signature, scoring: &Signature) -> bool {
    match validate(compute, feasibility, scoring) {
        Ok(()) => true,
        Err(e) => {
            warn!("incompatible signatures: {e}");
            false
        }
    }
}

fn check_arity(signature: &Signature, expected: usize) -> Result<(), SignatureError> {
    if signature.params.len() == expected {
        Ok(())
    } else {
        Err(SignatureError::Arity {
            function: signature.name.clone(),
            expected,
            found: signature.params.len(),
        })
    }
}
