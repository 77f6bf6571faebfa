//! Safe key-value coding.
//!
//! Reads go through the getter when the object implements one and fall back
//! to the instance variable. Writes go through the setter, so observers and
//! hooks on it see the change. Nothing here fails loudly: a missing key reads
//! as `None` and a rejected write returns `false`.

use intercept_core::{Object, Selector, Value};

/// Key-value access on runtime objects.
pub trait KeyValueCoding {
    /// Read `key`.
    fn value_for_key(&self, key: &str) -> Option<Value>;

    /// Write `key`. Returns whether the write happened.
    fn set_value_for_key(&self, key: &str, value: Value) -> bool;

    /// Read a dotted key path such as `owner.address.city`.
    fn value_for_key_path(&self, path: &str) -> Option<Value>;

    /// Write the last key of a dotted key path.
    fn set_value_for_key_path(&self, path: &str, value: Value) -> bool;
}

impl KeyValueCoding for Object {
    fn value_for_key(&self, key: &str) -> Option<Value> {
        let getter = Selector::new(key);
        let takes_no_arguments = self
            .runtime()
            .method_signature(self.isa(), getter)
            .is_some_and(|sig| sig.arity() == 0);
        if takes_no_arguments {
            return self.send(getter, &[]).ok();
        }
        self.ivar(key)
    }

    fn set_value_for_key(&self, key: &str, value: Value) -> bool {
        let setter = Selector::setter_for(key);
        if self.responds_to(setter) {
            return match self.send(setter, &[value]) {
                Ok(_) => true,
                Err(_err) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(object = %self.id(), key, error = %_err, "setter rejected value");
                    false
                }
            };
        }
        if self.ivar(key).is_some() {
            self.set_ivar(key, value);
            return true;
        }
        false
    }

    fn value_for_key_path(&self, path: &str) -> Option<Value> {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        let value = self.value_for_key(head)?;
        match rest {
            None => Some(value),
            Some(rest) => value.as_object()?.value_for_key_path(rest),
        }
    }

    fn set_value_for_key_path(&self, path: &str, value: Value) -> bool {
        match path.split_once('.') {
            None => self.set_value_for_key(path, value),
            Some((head, rest)) => match self.value_for_key(head) {
                Some(Value::Object(next)) => next.set_value_for_key_path(rest, value),
                _ => false,
            },
        }
    }
}
