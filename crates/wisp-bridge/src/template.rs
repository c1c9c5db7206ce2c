//! Class and enum templates
//!
//! The declarative, host-facing model of an exposed class: its methods,
//! properties, fields, indexed properties, and single-parent inheritance
//! link. Templates are registered before a session starts, are additive and
//! order-preserving, and outlive individual sessions; the materializer
//! compiles them into live prototype/constructor objects per context.

use wisp_script::NativeRef;

/// A method registration: name plus the opaque host method handle
#[derive(Clone, Debug)]
pub struct ClassMethod {
    /// Script-visible method name
    pub name: String,
    /// Opaque host method handle, returned unchanged in adapters
    pub handle: NativeRef,
}

/// A property registration. Also used for indexed properties, where the
/// handle is the indexed-property descriptor.
#[derive(Clone, Debug)]
pub struct ClassProperty {
    /// Script-visible property name
    pub name: String,
    /// Opaque host property descriptor
    pub handle: NativeRef,
    /// Install a getter
    pub read: bool,
    /// Install a setter
    pub write: bool,
}

/// A field registration
#[derive(Clone, Debug)]
pub struct ClassField {
    /// Script-visible field name
    pub name: String,
    /// Opaque host field handle
    pub handle: NativeRef,
}

/// Identifies a registered class template. `Global` addresses the single
/// global-object template.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TemplateId {
    /// The global-object template
    Global,
    /// A class template, by registration index
    Class(usize),
}

/// Identifies a registered enum template
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct EnumId(pub(crate) usize);

/// Declarative description of one exposed class
#[derive(Clone, Debug)]
pub struct ClassTemplate {
    /// Class name (becomes the constructor's global name)
    pub name: String,
    /// Opaque host class handle; at most one template per handle
    pub class_ref: NativeRef,
    pub(crate) methods: Vec<ClassMethod>,
    pub(crate) properties: Vec<ClassProperty>,
    pub(crate) indexed: Vec<ClassProperty>,
    pub(crate) fields: Vec<ClassField>,
    pub(crate) default_indexed: Option<NativeRef>,
    pub(crate) parent: Option<TemplateId>,
}

impl ClassTemplate {
    pub(crate) fn new(name: impl Into<String>, class_ref: NativeRef) -> Self {
        ClassTemplate {
            name: name.into(),
            class_ref,
            methods: Vec::new(),
            properties: Vec::new(),
            indexed: Vec::new(),
            fields: Vec::new(),
            default_indexed: None,
            parent: None,
        }
    }

    /// Parent template, if any
    pub fn parent(&self) -> Option<TemplateId> {
        self.parent
    }
}

/// Declarative description of one exposed enum
#[derive(Clone, Debug)]
pub struct EnumTemplate {
    /// Enum name (becomes the global object name)
    pub name: String,
    /// Ordered (ordinal, name) pairs as supplied by the host
    pub(crate) values: Vec<(i32, String)>,
}

/// Engine-wide registry of class and enum templates.
///
/// Outlives sessions: the same registrations are rematerialized on every
/// `start`. Registration never fails; unknown ids are ignored.
#[derive(Default)]
pub struct ClassRegistry {
    pub(crate) global: Option<ClassTemplate>,
    pub(crate) classes: Vec<ClassTemplate>,
    pub(crate) enums: Vec<EnumTemplate>,
}

impl ClassRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        ClassRegistry::default()
    }

    /// Register (or replace) the global-object template
    pub fn add_global(&mut self, class_ref: NativeRef) -> TemplateId {
        self.global = Some(ClassTemplate::new("global", class_ref));
        TemplateId::Global
    }

    /// Register a class template
    pub fn add_object(&mut self, name: impl Into<String>, class_ref: NativeRef) -> TemplateId {
        self.classes.push(ClassTemplate::new(name, class_ref));
        TemplateId::Class(self.classes.len() - 1)
    }

    /// Register an enum template
    pub fn add_enum(&mut self, name: impl Into<String>) -> EnumId {
        self.enums.push(EnumTemplate {
            name: name.into(),
            values: Vec::new(),
        });
        EnumId(self.enums.len() - 1)
    }

    /// Add one (name, ordinal) pair to an enum
    pub fn enum_add_value(&mut self, id: EnumId, name: impl Into<String>, ordinal: i32) {
        if let Some(e) = self.enums.get_mut(id.0) {
            e.values.push((ordinal, name.into()));
        }
    }

    /// Borrow a template
    pub fn template(&self, id: TemplateId) -> Option<&ClassTemplate> {
        match id {
            TemplateId::Global => self.global.as_ref(),
            TemplateId::Class(i) => self.classes.get(i),
        }
    }

    /// Mutably borrow a template
    pub fn template_mut(&mut self, id: TemplateId) -> Option<&mut ClassTemplate> {
        match id {
            TemplateId::Global => self.global.as_mut(),
            TemplateId::Class(i) => self.classes.get_mut(i),
        }
    }

    /// Find the unique template for a class handle.
    ///
    /// Checks the global template first, then classes in registration
    /// order. Returns `None` for classes that were never exposed — callers
    /// treat that as "not exposed", not as an error.
    pub fn by_class(&self, class_ref: NativeRef) -> Option<TemplateId> {
        if let Some(g) = &self.global {
            if g.class_ref == class_ref {
                return Some(TemplateId::Global);
            }
        }
        self.classes
            .iter()
            .position(|t| t.class_ref == class_ref)
            .map(TemplateId::Class)
    }

    /// Number of registered classes (excluding the global template)
    pub fn class_count(&self) -> usize {
        self.classes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_object_and_lookup() {
        let mut reg = ClassRegistry::new();
        let point = reg.add_object("Point", NativeRef::from_addr(0x10));
        let line = reg.add_object("Line", NativeRef::from_addr(0x20));

        assert_eq!(reg.by_class(NativeRef::from_addr(0x10)), Some(point));
        assert_eq!(reg.by_class(NativeRef::from_addr(0x20)), Some(line));
        assert_eq!(reg.by_class(NativeRef::from_addr(0x30)), None);
    }

    #[test]
    fn test_add_global_replaces() {
        let mut reg = ClassRegistry::new();
        reg.add_global(NativeRef::from_addr(0x1));
        reg.add_global(NativeRef::from_addr(0x2));

        assert_eq!(reg.by_class(NativeRef::from_addr(0x1)), None);
        assert_eq!(
            reg.by_class(NativeRef::from_addr(0x2)),
            Some(TemplateId::Global)
        );
    }

    #[test]
    fn test_enum_values_ordered() {
        let mut reg = ClassRegistry::new();
        let id = reg.add_enum("Color");
        reg.enum_add_value(id, "Red", 0);
        reg.enum_add_value(id, "Blue", 4);
        reg.enum_add_value(id, "Crimson", 0);

        assert_eq!(
            reg.enums[0].values,
            vec![
                (0, "Red".to_string()),
                (4, "Blue".to_string()),
                (0, "Crimson".to_string())
            ]
        );
    }

    #[test]
    fn test_registration_is_order_preserving() {
        let mut reg = ClassRegistry::new();
        let id = reg.add_object("Point", NativeRef::from_addr(0x10));
        let t = reg.template_mut(id).unwrap();
        t.methods.push(ClassMethod {
            name: "moveTo".to_string(),
            handle: NativeRef::from_addr(0x11),
        });
        t.methods.push(ClassMethod {
            name: "reset".to_string(),
            handle: NativeRef::from_addr(0x12),
        });

        let names: Vec<_> = reg.template(id).unwrap().methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["moveTo", "reset"]);
    }
}
