/// One entry of a type's field manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub confidential: bool,
}

impl Field {
    pub const fn plain(name: &'static str) -> Self {
        Self {
            name,
            confidential: false,
        }
    }

    pub const fn confidential(name: &'static str) -> Self {
        Self {
            name,
            confidential: true,
        }
    }
}

/// The type a node's owner must have
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerKind {
    Root,
    Kind(&'static str),
}

/// When a node's own public key is added to its recipients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelfRecipient {
    /// Only for types that support a password identity
    #[default]
    WhenPassword,
    /// Whenever the node has a public key
    Always,
}

/// Static metadata of a node type
///
/// Declared once per type, usually as a `static`:
///
/// ```
/// use common::object::{Field, OwnerKind, Policy};
///
/// static CITY: Policy = Policy::new("city", "cities", OwnerKind::Root)
///     .fields(&[Field::plain("name"), Field::confidential("mayor")]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    pub kind: &'static str,
    pub collection: &'static str,
    pub owner: OwnerKind,
    /// The owner chain gets an envelope for confidential fields
    pub owner_may_read: bool,
    /// The owner's owner may sign on the owner's behalf
    pub owner_may_write: bool,
    pub supports_password: bool,
    pub password_can_sign: bool,
    pub self_recipient: SelfRecipient,
    pub fields: &'static [Field],
}

impl Policy {
    pub const fn new(kind: &'static str, collection: &'static str, owner: OwnerKind) -> Self {
        Self {
            kind,
            collection,
            owner,
            owner_may_read: true,
            owner_may_write: true,
            supports_password: false,
            password_can_sign: false,
            self_recipient: SelfRecipient::WhenPassword,
            fields: &[],
        }
    }

    pub const fn fields(self, fields: &'static [Field]) -> Self {
        Self { fields, ..self }
    }

    pub const fn owner_may_read(self, owner_may_read: bool) -> Self {
        Self {
            owner_may_read,
            ..self
        }
    }

    pub const fn owner_may_write(self, owner_may_write: bool) -> Self {
        Self {
            owner_may_write,
            ..self
        }
    }

    pub const fn password(self, supports_password: bool, password_can_sign: bool) -> Self {
        Self {
            supports_password,
            password_can_sign,
            ..self
        }
    }

    pub const fn self_recipient(self, self_recipient: SelfRecipient) -> Self {
        Self {
            self_recipient,
            ..self
        }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_confidential(&self) -> bool {
        self.fields.iter().any(|f| f.confidential)
    }

    pub fn plain_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| !f.confidential)
    }

    pub fn confidential_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.confidential)
    }
}
