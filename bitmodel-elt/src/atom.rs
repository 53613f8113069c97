//! Scalar element

use crate::elt::{degrade, indent, packed_text, title, Elt, EltBase, EltKind, EnumDict};
use crate::resolve::{callback, Resolvable};
use crate::scalar::{BitStr, Buf, Int, ScalarCodec, Uint};
use crate::scope::Scope;
use bitmodel_core::{BitCursor, EltError, EltResult, Repr, Safety, Triple, Value};
use log::trace;
use std::rc::Rc;

/// A leaf holding one typed value
///
/// The value, the bit length and the enumeration table are each resolved as
/// explicit, then callback, then default. The bit length callback is only
/// consulted while decoding.
#[derive(Debug, Clone)]
pub struct Atom {
    base: EltBase,
    codec: Rc<dyn ScalarCodec>,
    default: Value,
    val: Resolvable<Value>,
    bl: Resolvable<usize>,
    dict: Resolvable<Rc<EnumDict>>,
}

impl Atom {
    pub fn new(name: impl Into<String>, codec: impl ScalarCodec + 'static) -> Self {
        let default = codec.default_value();
        Self {
            base: EltBase::new(name),
            codec: Rc::new(codec),
            default,
            val: Resolvable::new(),
            bl: Resolvable::new(),
            dict: Resolvable::new(),
        }
    }

    /// Unsigned integer over `bits` bits
    pub fn uint(name: impl Into<String>, bits: usize) -> Self {
        Self::new(name, Uint { bits })
    }

    pub fn uint8(name: impl Into<String>) -> Self {
        Self::uint(name, 8)
    }

    pub fn uint16(name: impl Into<String>) -> Self {
        Self::uint(name, 16)
    }

    pub fn uint32(name: impl Into<String>) -> Self {
        Self::uint(name, 32)
    }

    /// Signed integer over `bits` bits
    pub fn int(name: impl Into<String>, bits: usize) -> Self {
        Self::new(name, Int { bits })
    }

    pub fn buf(name: impl Into<String>) -> Self {
        Self::new(name, Buf::default())
    }

    /// Byte buffer consuming the rest of the visible window when decoded
    /// without a length
    pub fn buf_rest(name: impl Into<String>) -> Self {
        Self::new(name, Buf::rest())
    }

    pub fn bits(name: impl Into<String>) -> Self {
        Self::new(name, BitStr)
    }

    pub fn codec(&self) -> &dyn ScalarCodec {
        self.codec.as_ref()
    }

    /// Value used when neither an explicit value nor a callback is set
    pub fn default_value(&self) -> &Value {
        &self.default
    }

    pub fn with_default(mut self, val: impl Into<Value>) -> EltResult<Self> {
        let val = val.into();
        self.check_static("default", &val)?;
        self.default = val;
        Ok(self)
    }

    pub fn with_val(self, val: impl Into<Value>) -> EltResult<Self> {
        let val = val.into();
        self.check_static("set_val", &val)?;
        self.val.set(Some(val));
        Ok(self)
    }

    pub fn with_bl(self, bl: usize) -> EltResult<Self> {
        self.check_bl(bl)?;
        self.bl.set(Some(bl));
        Ok(self)
    }

    pub fn with_val_auto<V, F>(self, f: F) -> Self
    where
        V: Into<Value>,
        F: Fn(&Scope<'_>) -> EltResult<V> + 'static,
    {
        self.set_val_auto(f);
        self
    }

    pub fn with_bl_auto<F>(self, f: F) -> Self
    where
        F: Fn(&Scope<'_>) -> EltResult<usize> + 'static,
    {
        self.set_bl_auto(f);
        self
    }

    pub fn with_dict<V, S, I>(self, pairs: I) -> Self
    where
        V: Into<Value>,
        S: Into<String>,
        I: IntoIterator<Item = (V, S)>,
    {
        let dict: EnumDict = pairs
            .into_iter()
            .map(|(v, s)| (v.into(), s.into()))
            .collect();
        self.dict.set(Some(Rc::new(dict)));
        self
    }

    pub fn with_dict_auto<F>(self, f: F) -> Self
    where
        F: Fn(&Scope<'_>) -> EltResult<Rc<EnumDict>> + 'static,
    {
        self.set_dict_auto(f);
        self
    }

    /// Install a value callback
    pub fn set_val_auto<V, F>(&self, f: F)
    where
        V: Into<Value>,
        F: Fn(&Scope<'_>) -> EltResult<V> + 'static,
    {
        self.val
            .set_auto(Some(callback(move |s| f(s).map(Into::into))));
    }

    pub fn clear_val_auto(&self) {
        self.val.set_auto(None);
    }

    /// Install a decode-time bit length callback
    pub fn set_bl_auto<F>(&self, f: F)
    where
        F: Fn(&Scope<'_>) -> EltResult<usize> + 'static,
    {
        self.bl.set_auto(Some(callback(f)));
    }

    pub fn clear_bl_auto(&self) {
        self.bl.set_auto(None);
    }

    pub fn set_dict(&self, dict: Option<EnumDict>) {
        self.dict.set(dict.map(Rc::new));
    }

    pub fn set_dict_auto<F>(&self, f: F)
    where
        F: Fn(&Scope<'_>) -> EltResult<Rc<EnumDict>> + 'static,
    {
        self.dict.set_auto(Some(callback(f)));
    }

    pub fn clear_dict_auto(&self) {
        self.dict.set_auto(None);
    }

    /// Explicit bit length, if any
    pub fn bl_raw(&self) -> Option<usize> {
        self.bl.raw()
    }

    fn check_value(&self, val: &Value) -> Result<(), String> {
        self.codec.check(val, self.bl.raw())
    }

    fn check_static(&self, op: &'static str, val: &Value) -> EltResult<()> {
        if Safety::current().check_static {
            self.check_value(val)
                .map_err(|detail| EltError::type_error(self.base.name(), op, detail))?;
        }
        Ok(())
    }

    fn check_bl(&self, bl: usize) -> EltResult<()> {
        if Safety::current().check_static {
            self.codec
                .check_bit_length(bl)
                .map_err(|detail| EltError::type_error(self.base.name(), "set_bl", detail))?;
        }
        Ok(())
    }

    /// Bit length of a resolved value: explicit length, else inferred
    fn measure(&self, val: &Value) -> usize {
        self.bl
            .raw()
            .unwrap_or_else(|| self.codec.bit_length_of(val))
    }

    fn render(&self, scope: &Scope<'_>, with_label: bool) -> EltResult<String> {
        let name = self.base.name();
        let val = match degrade(name, "repr", self.value_in(scope))? {
            Some(val) => val,
            None => return Ok("?".to_string()),
        };
        let mut out = self.codec.render(&val);
        if with_label {
            if let Some(label) = degrade(name, "repr", self.enum_label_in(scope))?.flatten() {
                out.push_str(&format!(" ({})", label));
            }
        }
        Ok(out)
    }
}

impl Elt for Atom {
    fn base(&self) -> &EltBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EltBase {
        &mut self.base
    }

    fn kind(&self) -> EltKind {
        EltKind::Atom
    }

    fn as_dyn(&self) -> &dyn Elt {
        self
    }

    fn value_in(&self, scope: &Scope<'_>) -> EltResult<Value> {
        self.val.resolve(
            scope,
            "value",
            || self.default.clone(),
            |val| self.check_value(val),
        )
    }

    fn set_val_in(&self, _scope: &Scope<'_>, val: Value) -> EltResult<()> {
        self.check_static("set_val", &val)?;
        self.val.set(Some(val));
        Ok(())
    }

    fn clear_val(&self) {
        self.val.set(None);
    }

    fn bit_length_in(&self, scope: &Scope<'_>) -> EltResult<usize> {
        if self.transparent_in(scope)? {
            return Ok(0);
        }
        if let Some(bl) = self.bl.raw() {
            return Ok(bl);
        }
        let val = degrade(self.base.name(), "bit_length", self.value_in(scope))?;
        Ok(val.map_or(0, |val| self.codec.bit_length_of(&val)))
    }

    fn set_bl_in(&self, _scope: &Scope<'_>, bl: Option<usize>) -> EltResult<()> {
        if let Some(bl) = bl {
            self.check_bl(bl)?;
        }
        self.bl.set(bl);
        Ok(())
    }

    fn encode_in(&self, scope: &Scope<'_>, out: &mut Vec<Triple>) -> EltResult<()> {
        if self.transparent_in(scope)? {
            return Ok(());
        }
        let val = self.value_in(scope)?;
        let bl = self.measure(&val);
        let triple = self
            .codec
            .pack(&val, bl)
            .map_err(|detail| EltError::type_error(self.base.name(), "encode", detail))?;
        trace!("{:?}: encode {} bits", scope, bl);
        out.push(triple);
        Ok(())
    }

    fn decode_in(&self, scope: &Scope<'_>, cur: &mut BitCursor<'_>) -> EltResult<()> {
        if self.transparent_in(scope)? {
            return Ok(());
        }
        let bl = match self
            .bl
            .resolve_opt(scope, "bit_length", |bl| self.codec.check_bit_length(*bl))?
        {
            Some(bl) => bl,
            None => {
                let current = self.val.raw().unwrap_or_else(|| self.default.clone());
                self.codec.decode_bit_length(cur.remaining(), &current)
            }
        };
        trace!("{:?}: decode {} bits at bit {}", scope, bl, cur.position());
        let val = self.codec.unpack(cur, bl)?;
        self.val.set(Some(val));
        Ok(())
    }

    fn enum_table_in(&self, scope: &Scope<'_>) -> EltResult<Option<Rc<EnumDict>>> {
        self.dict.resolve_opt(scope, "dict", |_| Ok(()))
    }

    fn is_static(&self) -> bool {
        self.callbacks().is_empty()
    }

    fn callbacks(&self) -> Vec<&'static str> {
        let mut out = self.base.callbacks();
        if self.val.has_auto() {
            out.push("val");
        }
        if self.bl.has_auto() {
            out.push("bl");
        }
        if self.dict.has_auto() {
            out.push("dict");
        }
        out
    }

    fn repr_in(&self, scope: &Scope<'_>) -> EltResult<String> {
        let title = title(scope)?;
        let body = match self.base.repr_mode() {
            Repr::Raw => self.render(scope, false)?,
            Repr::Human => self.render(scope, true)?,
            rep => match degrade(self.base.name(), "repr", packed_text(scope, rep))? {
                Some(text) => text,
                None => "?".to_string(),
            },
        };
        Ok(format!("<{} : {}>", title, body))
    }

    fn show_in(&self, scope: &Scope<'_>, out: &mut String) -> EltResult<()> {
        out.push_str(&indent(scope));
        out.push_str(&self.repr_in(scope)?);
        out.push('\n');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elt::EltExt;
    use bitmodel_core::{BitString, CursorError};

    #[test]
    fn test_default_and_explicit_value() {
        let atom = Atom::uint8("Tag");
        assert_eq!(atom.value().unwrap(), Value::Uint(0));
        atom.set_val(5u8).unwrap();
        assert_eq!(atom.value().unwrap(), Value::Uint(5));
        atom.clear_val();
        assert_eq!(atom.value().unwrap(), Value::Uint(0));
    }

    #[test]
    fn test_set_val_checks_type_set() {
        let atom = Atom::uint8("Tag");
        let err = atom.set_val(b"AB").unwrap_err();
        assert!(matches!(err, EltError::Type { op: "set_val", .. }));
        assert!(atom.set_val(256u16).is_err());
        assert_eq!(atom.value().unwrap(), Value::Uint(0));

        let _guard = Safety {
            check_static: false,
            ..Safety::default()
        }
        .install();
        atom.set_val(b"AB").unwrap();
        assert_eq!(atom.value().unwrap(), Value::from(b"AB"));
    }

    #[test]
    fn test_raw_value_beats_callback() {
        let atom = Atom::uint8("x").with_val_auto(|_| Ok(9u8));
        assert_eq!(atom.value().unwrap(), Value::Uint(9));
        atom.set_val(1u8).unwrap();
        assert_eq!(atom.value().unwrap(), Value::Uint(1));
        atom.clear_val();
        assert_eq!(atom.value().unwrap(), Value::Uint(9));
    }

    #[test]
    fn test_invalid_callback_value() {
        let atom = Atom::uint8("x").with_val_auto(|_| Ok(b"no".to_vec()));
        assert!(matches!(
            atom.value().unwrap_err(),
            EltError::Resolution { op: "value", .. }
        ));
        assert!(atom.to_bytes().is_err());

        let _guard = Safety {
            fuzzing: true,
            ..Safety::default()
        }
        .install();
        assert_eq!(atom.bit_length().unwrap(), 8);
        assert!(atom.repr().is_ok());
        assert!(atom.to_bytes().is_err());
    }

    #[test]
    fn test_bit_length() {
        let atom = Atom::buf("Value");
        assert_eq!(atom.bit_length().unwrap(), 0);
        atom.set_val(b"ABC").unwrap();
        assert_eq!(atom.bit_length().unwrap(), 24);
        atom.set_bl(Some(12)).unwrap();
        assert_eq!(atom.bit_length().unwrap(), 12);
        atom.set_bl(None).unwrap();
        assert_eq!(atom.bit_length().unwrap(), 24);
    }

    #[test]
    fn test_bl_callback_only_used_to_decode() {
        let atom = Atom::buf("Value").with_bl_auto(|_| Ok(16));
        atom.set_val(b"ABC").unwrap();
        assert_eq!(atom.bit_length().unwrap(), 24);

        let used = atom.from_bytes(b"XYZ").unwrap();
        assert_eq!(used, 16);
        assert_eq!(atom.value().unwrap(), Value::from(b"XY"));
    }

    #[test]
    fn test_transparent() {
        let atom = Atom::uint8("x").with_val(3u8).unwrap().with_trans(true);
        assert_eq!(atom.bit_length().unwrap(), 0);
        assert!(atom.to_triples().unwrap().is_empty());
        assert_eq!(atom.from_bytes(&[0xFF]).unwrap(), 0);
        assert_eq!(atom.value().unwrap(), Value::Uint(3));

        atom.base().set_trans(None);
        assert_eq!(atom.bit_length().unwrap(), 8);
    }

    #[test]
    fn test_encode_decode_odd_widths() {
        let atom = Atom::uint("x", 3).with_val(5u8).unwrap();
        assert_eq!(atom.to_triples().unwrap(), vec![Triple::Uint { val: 5, bl: 3 }]);
        assert_eq!(&atom.to_bytes().unwrap()[..], &[0b1010_0000]);

        let neg = Atom::int("y", 12);
        neg.from_bytes(&[0xFF, 0xE0]).unwrap();
        assert_eq!(neg.value().unwrap(), Value::Int(-2));
    }

    #[test]
    fn test_decode_past_end() {
        let atom = Atom::uint16("x");
        let err = atom.from_bytes(&[1]).unwrap_err();
        assert!(matches!(err, EltError::Cursor(CursorError::OutOfBounds { .. })));
    }

    #[test]
    fn test_buf_rest_and_bits() {
        let atom = Atom::buf_rest("Tail");
        assert_eq!(atom.from_bytes(b"hello").unwrap(), 40);
        assert_eq!(atom.value().unwrap(), Value::from(b"hello"));

        let bits = Atom::bits("Flags")
            .with_val(BitString::from_uint(0b101, 3).unwrap())
            .unwrap();
        assert_eq!(bits.bit_length().unwrap(), 3);
        assert_eq!(&bits.to_bytes().unwrap()[..], &[0b1010_0000]);
    }

    #[test]
    fn test_enum_label_and_human_repr() {
        let atom = Atom::uint8("Type")
            .with_dict([(1u8, "Request"), (2u8, "Response")])
            .with_repr(Repr::Human)
            .with_val(2u8)
            .unwrap();
        assert_eq!(atom.enum_label().unwrap().as_deref(), Some("Response"));
        assert_eq!(atom.repr().unwrap(), "<Type : 2 (Response)>");

        atom.set_val(7u8).unwrap();
        assert_eq!(atom.enum_label().unwrap(), None);
        assert_eq!(atom.repr().unwrap(), "<Type : 7>");
    }

    #[test]
    fn test_enum_table_precedence() {
        let atom = Atom::uint8("Type")
            .with_dict_auto(|_| Ok(Rc::new(EnumDict::from([(Value::Uint(1), "Auto".to_string())]))))
            .with_val(1u8)
            .unwrap();
        assert_eq!(atom.enum_label().unwrap().as_deref(), Some("Auto"));

        atom.set_dict(Some(EnumDict::from([(Value::Uint(1), "Fixed".to_string())])));
        assert_eq!(atom.enum_label().unwrap().as_deref(), Some("Fixed"));

        atom.set_dict(None);
        assert_eq!(atom.enum_label().unwrap().as_deref(), Some("Auto"));

        atom.clear_dict_auto();
        assert_eq!(atom.enum_label().unwrap(), None);
        assert_eq!(atom.attrs().unwrap().dict, None);
    }

    #[test]
    fn test_hex_and_bin_repr() {
        let atom = Atom::uint16("x").with_val(0x41u16).unwrap().with_repr(Repr::Hex);
        assert_eq!(atom.repr().unwrap(), "<x : 0x0041>");
        atom.base().set_repr(Repr::Bin);
        assert_eq!(atom.repr().unwrap(), "<x : 0b0000000001000001>");
    }

    #[test]
    fn test_attrs() {
        let atom = Atom::uint8("Len")
            .with_desc("length in bytes")
            .with_val_auto(|_| Ok(4u8));
        let attrs = atom.attrs().unwrap();
        assert_eq!(attrs.name, "Len");
        assert_eq!(attrs.desc, "length in bytes");
        assert_eq!(attrs.kind, EltKind::Atom);
        assert_eq!(attrs.val, Some(Value::Uint(4)));
        assert_eq!(attrs.bl, Some(8));
        assert_eq!(attrs.trans, Some(false));
        assert!(attrs.callbacks.is_empty());
        assert_eq!(atom.attrs_full().unwrap().callbacks, vec!["val"]);
        assert!(!atom.is_static());
    }

    #[test]
    fn test_clone_is_detached() {
        let atom = Atom::uint8("x").with_val(1u8).unwrap();
        let copy = atom.clone();
        assert_ne!(atom.id(), copy.id());
        assert_eq!(copy.container(), None);
        copy.set_val(2u8).unwrap();
        assert_eq!(atom.value().unwrap(), Value::Uint(1));
    }
}
