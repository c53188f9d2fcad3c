//! Interned references to strings, types, fields, methods and array payloads.
//!
//! References are immutable, reference-counted handles. Equality and hashing look at the
//! referenced content, so two handles created independently compare equal; the
//! [`RefPool`] only makes sure that equal content shares one allocation.
//!
//! Descriptors use the Dalvik notation: `I`, `J`, `Ljava/lang/String;`, `[I`, and method
//! references print as `Lowner;.name:(args)ret`.

use std::{fmt, sync::Arc};

use dashmap::DashMap;

use crate::Result;

/// A string constant.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StringRef(Arc<str>);

impl StringRef {
    /// Wraps `value` without interning it.
    #[must_use]
    pub fn new(value: &str) -> Self {
        StringRef(Arc::from(value))
    }

    /// The string content.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StringRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl fmt::Debug for StringRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// A type descriptor such as `I`, `J` or `Ljava/lang/Object;`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeRef(Arc<str>);

impl TypeRef {
    /// Wraps `descriptor` without interning it.
    #[must_use]
    pub fn new(descriptor: &str) -> Self {
        TypeRef(Arc::from(descriptor))
    }

    /// The descriptor text.
    #[must_use]
    pub fn descriptor(&self) -> &str {
        &self.0
    }

    /// `long` and `double` occupy a register pair.
    #[must_use]
    pub fn is_wide(&self) -> bool {
        matches!(&*self.0, "J" | "D")
    }

    /// `V`.
    #[must_use]
    pub fn is_void(&self) -> bool {
        &*self.0 == "V"
    }

    /// Class and array types.
    #[must_use]
    pub fn is_object(&self) -> bool {
        self.0.starts_with('L') || self.0.starts_with('[')
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A method prototype: return type and parameter types, receiver excluded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Proto {
    /// Return type.
    pub ret: TypeRef,
    /// Parameter types in declaration order.
    pub args: Vec<TypeRef>,
}

impl fmt::Display for Proto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for arg in &self.args {
            write!(f, "{arg}")?;
        }
        write!(f, "){}", self.ret)
    }
}

#[derive(Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct FieldData {
    owner: TypeRef,
    name: Arc<str>,
    ty: TypeRef,
}

/// A field reference `Lowner;.name:type`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldRef(Arc<FieldData>);

impl FieldRef {
    /// Creates a reference without interning it.
    #[must_use]
    pub fn new(owner: TypeRef, name: &str, ty: TypeRef) -> Self {
        FieldRef(Arc::new(FieldData {
            owner,
            name: Arc::from(name),
            ty,
        }))
    }

    /// Declaring class.
    #[must_use]
    pub fn owner(&self) -> &TypeRef {
        &self.0.owner
    }

    /// Field name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Field type.
    #[must_use]
    pub fn ty(&self) -> &TypeRef {
        &self.0.ty
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}:{}", self.0.owner, self.0.name, self.0.ty)
    }
}

impl fmt::Debug for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[derive(Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct MethodData {
    owner: TypeRef,
    name: Arc<str>,
    proto: Proto,
}

/// A method reference `Lowner;.name:(args)ret`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodRef(Arc<MethodData>);

impl MethodRef {
    /// Creates a reference without interning it.
    #[must_use]
    pub fn new(owner: TypeRef, name: &str, proto: Proto) -> Self {
        MethodRef(Arc::new(MethodData {
            owner,
            name: Arc::from(name),
            proto,
        }))
    }

    /// Declaring class.
    #[must_use]
    pub fn owner(&self) -> &TypeRef {
        &self.0.owner
    }

    /// Method name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Prototype.
    #[must_use]
    pub fn proto(&self) -> &Proto {
        &self.0.proto
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}:{}", self.0.owner, self.0.name, self.0.proto)
    }
}

impl fmt::Debug for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// An array payload for `fill-array-data`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataRef(Arc<ArrayData>);

#[derive(Debug, PartialEq, Eq, Hash)]
struct ArrayData {
    element_width: u16,
    bytes: Vec<u8>,
}

impl DataRef {
    /// Payload of `bytes.len() / element_width` elements.
    ///
    /// # Panics
    ///
    /// Panics if `element_width` is zero or does not divide the payload length.
    #[must_use]
    pub fn new(element_width: u16, bytes: Vec<u8>) -> Self {
        assert!(
            element_width > 0 && bytes.len() % usize::from(element_width) == 0,
            "array payload of {} bytes is not a whole number of {element_width}-byte elements",
            bytes.len()
        );
        DataRef(Arc::new(ArrayData {
            element_width,
            bytes,
        }))
    }

    /// Width of one element in bytes.
    #[must_use]
    pub fn element_width(&self) -> u16 {
        self.0.element_width
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.bytes.len() / usize::from(self.0.element_width)
    }

    /// Returns `true` for an empty payload.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.bytes.is_empty()
    }

    /// Raw little-endian payload.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.0.bytes
    }
}

impl fmt::Display for DataRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} x {}B>", self.len(), self.0.element_width)
    }
}

/// Concurrent interner for references.
///
/// A single pool is shared by every thread of a [`PassScheduler`](crate::compiler::PassScheduler)
/// run; lookups and insertions go through `dashmap` shards and never take a global lock.
#[derive(Debug, Default)]
pub struct RefPool {
    strings: DashMap<Arc<str>, ()>,
    types: DashMap<Arc<str>, TypeRef>,
    fields: DashMap<(TypeRef, Arc<str>, TypeRef), FieldRef>,
    methods: DashMap<(TypeRef, Arc<str>, Proto), MethodRef>,
}

impl RefPool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn intern_str(&self, value: &str) -> Arc<str> {
        if let Some(entry) = self.strings.get(value) {
            return entry.key().clone();
        }
        self.strings
            .entry(Arc::from(value))
            .or_insert(())
            .key()
            .clone()
    }

    /// Interns a string constant.
    pub fn string(&self, value: &str) -> StringRef {
        StringRef(self.intern_str(value))
    }

    /// Interns a type descriptor.
    pub fn ty(&self, descriptor: &str) -> TypeRef {
        if let Some(entry) = self.types.get(descriptor) {
            return entry.value().clone();
        }
        let key = self.intern_str(descriptor);
        self.types
            .entry(key.clone())
            .or_insert_with(|| TypeRef(key))
            .value()
            .clone()
    }

    /// Interns a field reference.
    pub fn field(&self, owner: &str, name: &str, ty: &str) -> FieldRef {
        let (owner, name, ty) = (self.ty(owner), self.intern_str(name), self.ty(ty));
        self.fields
            .entry((owner.clone(), name.clone(), ty.clone()))
            .or_insert_with(|| FieldRef(Arc::new(FieldData { owner, name, ty })))
            .value()
            .clone()
    }

    /// Interns a method reference from its parts. `proto` is a descriptor like `(IJ)V`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if `proto` is not a valid prototype descriptor.
    pub fn method(&self, owner: &str, name: &str, proto: &str) -> Result<MethodRef> {
        let proto = self.proto(proto)?;
        let (owner, name) = (self.ty(owner), self.intern_str(name));
        Ok(self
            .methods
            .entry((owner.clone(), name.clone(), proto.clone()))
            .or_insert_with(|| MethodRef(Arc::new(MethodData { owner, name, proto })))
            .value()
            .clone())
    }

    /// Parses and interns a full method signature `Lowner;.name:(args)ret`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the signature does not have that shape.
    pub fn method_from_signature(&self, signature: &str) -> Result<MethodRef> {
        let (owner, rest) = signature
            .split_once(";.")
            .ok_or_else(|| malformed_error!("method signature without owner: {}", signature))?;
        let (name, proto) = rest
            .split_once(':')
            .ok_or_else(|| malformed_error!("method signature without prototype: {}", signature))?;
        if name.is_empty() {
            return Err(malformed_error!("method signature without name: {}", signature));
        }
        self.method(&format!("{owner};"), name, proto)
    }

    /// Parses a prototype descriptor like `(ILjava/lang/String;)V`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] on an invalid descriptor.
    pub fn proto(&self, descriptor: &str) -> Result<Proto> {
        let inner = descriptor
            .strip_prefix('(')
            .ok_or_else(|| malformed_error!("prototype must start with '(': {}", descriptor))?;
        let (params, ret) = inner
            .split_once(')')
            .ok_or_else(|| malformed_error!("prototype without ')': {}", descriptor))?;

        let mut args = Vec::new();
        let mut rest = params;
        while !rest.is_empty() {
            let len = descriptor_len(rest)
                .filter(|_| !rest.starts_with('V'))
                .ok_or_else(|| malformed_error!("bad parameter type in {}", descriptor))?;
            args.push(self.ty(&rest[..len]));
            rest = &rest[len..];
        }

        if descriptor_len(ret) != Some(ret.len()) {
            return Err(malformed_error!("bad return type in {}", descriptor));
        }
        Ok(Proto {
            ret: self.ty(ret),
            args,
        })
    }

    /// Number of distinct strings held, descriptors and names included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Returns `true` if nothing has been interned yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

/// Length in bytes of the first type descriptor in `s`.
fn descriptor_len(s: &str) -> Option<usize> {
    let dims = s.bytes().take_while(|&b| b == b'[').count();
    let base = s.as_bytes().get(dims)?;
    let base_len = match base {
        b'V' if dims == 0 => 1,
        b'Z' | b'B' | b'S' | b'C' | b'I' | b'J' | b'F' | b'D' => 1,
        b'L' => s[dims..].find(';')? + 1,
        _ => return None,
    };
    Some(dims + base_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_shares_allocation() {
        let pool = RefPool::new();
        let a = pool.ty("Ljava/lang/Object;");
        let b = pool.ty("Ljava/lang/Object;");
        assert!(Arc::ptr_eq(&a.0, &b.0));
        assert_eq!(a, TypeRef::new("Ljava/lang/Object;"));
    }

    #[test]
    fn parse_method_signature() {
        let pool = RefPool::new();
        let m = pool
            .method_from_signature("LFoo;.bar:(I[JLjava/lang/String;)V")
            .unwrap();
        assert_eq!(m.owner().descriptor(), "LFoo;");
        assert_eq!(m.name(), "bar");
        assert_eq!(m.proto().args.len(), 3);
        assert!(m.proto().ret.is_void());
        assert!(!m.proto().args[1].is_wide());
        assert_eq!(m.to_string(), "LFoo;.bar:(I[JLjava/lang/String;)V");

        let again = pool
            .method_from_signature("LFoo;.bar:(I[JLjava/lang/String;)V")
            .unwrap();
        assert!(Arc::ptr_eq(&m.0, &again.0));
    }

    #[test]
    fn reject_bad_signatures() {
        let pool = RefPool::new();
        assert!(pool.method_from_signature("bar:(I)V").is_err());
        assert!(pool.method_from_signature("LFoo;.bar").is_err());
        assert!(pool.proto("(Q)V").is_err());
        assert!(pool.proto("(I)").is_err());
        assert!(pool.proto("(LFoo)V").is_err());
        assert!(pool.proto("(V)V").is_err());
    }

    #[test]
    fn fields_and_strings() {
        let pool = RefPool::new();
        let f = pool.field("LFoo;", "count", "J");
        assert!(f.ty().is_wide());
        assert_eq!(f.to_string(), "LFoo;.count:J");
        assert_eq!(pool.string("hi").to_string(), "\"hi\"");
        assert!(!pool.is_empty());
    }

    #[test]
    fn array_payload() {
        let data = DataRef::new(4, vec![0; 12]);
        assert_eq!(data.len(), 3);
        assert_eq!(data.to_string(), "<3 x 4B>");
    }
}
