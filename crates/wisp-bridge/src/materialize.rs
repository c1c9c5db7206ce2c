//! Template materialization
//!
//! Compiles the registry's declarative templates into live context objects
//! at session start: one prototype plus constructor per class, trampolines
//! installed in registration order, inheritance wired through prototype
//! links, the global template applied to the context's global object, and
//! enum value objects attached. Materialization failures surface as absent
//! prototypes that every consumer checks before use.

use std::rc::Rc;

use wisp_script::{
    Callable, JsValue, NativeRef, ObjectData, ObjectKind, ObjectRef, PropertySlot, ScriptContext,
    Trampoline, TrampolineOp,
};

use crate::engine::Engine;
use crate::session::OBJECT_SLOT_COUNT;
use crate::template::{ClassTemplate, TemplateId};

impl Engine {
    /// Build every registered template into the freshly created context.
    /// Called once from `start`, before global links and pre-code run.
    pub(crate) fn materialize_context(&mut self) {
        let class_count = self.registry().class_count();
        for idx in 0..class_count {
            let mut visiting = Vec::new();
            self.ensure_class(idx, &mut visiting);
        }
        // constructors become named globals, so class names resolve and
        // instanceof works from script
        for idx in 0..class_count {
            let Some(proto) = self
                .session_ref()
                .and_then(|s| s.prototypes.get(idx).copied().flatten())
            else {
                continue;
            };
            let Some(name) = self
                .registry()
                .template(TemplateId::Class(idx))
                .map(|t| t.name.clone())
            else {
                continue;
            };
            let Some(session) = self.session_mut() else {
                return;
            };
            let mut ctor = ObjectData::new(ObjectKind::Plain);
            ctor.class_name = Some(Rc::from(name.as_str()));
            let ctor_ref = session.ctx.alloc(ctor);
            session.ctx.define_property(
                ctor_ref,
                "prototype",
                PropertySlot::Data(JsValue::Object(proto)),
            );
            let global = session.ctx.global();
            session
                .ctx
                .define_property(global, &name, PropertySlot::Data(JsValue::Object(ctor_ref)));
        }
        // the global object is itself an exposed instance of the global
        // template: class slot set, pointer slot left undefined
        if let Some(global_template) = self.registry().global.clone() {
            if let Some(session) = self.session_mut() {
                let global = session.ctx.global();
                if let Some(obj) = session.ctx.object_mut(global) {
                    obj.internal = vec![
                        JsValue::External(global_template.class_ref),
                        JsValue::Undefined,
                    ];
                }
                apply_members(&mut session.ctx, global, &global_template);
            }
        }
        // enums with no registered values are skipped entirely
        let enums = self.registry().enums.clone();
        if let Some(session) = self.session_mut() {
            let global = session.ctx.global();
            for e in &enums {
                if e.values.is_empty() {
                    continue;
                }
                let obj = session.ctx.new_plain(None);
                for (ordinal, name) in &e.values {
                    session
                        .ctx
                        .define_property(obj, name, PropertySlot::Data(JsValue::Int32(*ordinal)));
                }
                session
                    .ctx
                    .define_property(global, &e.name, PropertySlot::Data(JsValue::Object(obj)));
            }
        }
    }

    /// Materialize one class prototype, parents first, so instances chain
    /// to every ancestor. A parent cycle degrades to "no parent".
    fn ensure_class(&mut self, idx: usize, visiting: &mut Vec<usize>) -> Option<ObjectRef> {
        if let Some(existing) = self
            .session_ref()
            .and_then(|s| s.prototypes.get(idx).copied().flatten())
        {
            return Some(existing);
        }
        if visiting.contains(&idx) {
            return None;
        }
        visiting.push(idx);
        let template = self.registry().template(TemplateId::Class(idx))?.clone();
        let parent_proto = match template.parent() {
            Some(TemplateId::Class(p)) if p != idx => self.ensure_class(p, visiting),
            _ => None,
        };
        let session = self.session_mut()?;
        let mut data = ObjectData::new(ObjectKind::Plain);
        data.class_name = Some(Rc::from(template.name.as_str()));
        data.proto = parent_proto;
        let proto = session.ctx.alloc(data);
        if let Some(slot) = session.prototypes.get_mut(idx) {
            *slot = Some(proto);
        }
        apply_members(&mut session.ctx, proto, &template);
        Some(proto)
    }

    /// Instantiate the materialized prototype for a class handle. Returns
    /// nothing for unregistered classes or before materialization — the
    /// single checked failure path for engine-resource problems.
    pub(crate) fn instantiate_by_class(&mut self, class: NativeRef) -> Option<ObjectRef> {
        let idx = self
            .registry()
            .classes
            .iter()
            .position(|t| t.class_ref == class)?;
        let name = self.registry().classes[idx].name.clone();
        let proto = self
            .session_ref()?
            .prototypes
            .get(idx)
            .copied()
            .flatten()?;
        let session = self.session_mut()?;
        let mut data = ObjectData::new(ObjectKind::Plain);
        data.class_name = Some(Rc::from(name.as_str()));
        data.proto = Some(proto);
        data.internal = vec![JsValue::Undefined; OBJECT_SLOT_COUNT];
        Some(session.ctx.alloc(data))
    }
}

/// Install a template's members on a target object, in registration order.
/// Later registrations of the same name overwrite earlier ones.
fn apply_members(ctx: &mut ScriptContext, target: ObjectRef, template: &ClassTemplate) {
    for method in &template.methods {
        let mut f = ObjectData::new(ObjectKind::Plain);
        f.class_name = Some(Rc::from(method.name.as_str()));
        f.call = Some(Callable::Bound(Trampoline {
            op: TrampolineOp::Method,
            data: method.handle,
        }));
        let f_ref = ctx.alloc(f);
        ctx.define_property(target, &method.name, PropertySlot::Data(JsValue::Object(f_ref)));
    }
    for prop in &template.properties {
        ctx.define_property(
            target,
            &prop.name,
            PropertySlot::Accessor {
                getter: prop.read.then_some(Trampoline {
                    op: TrampolineOp::PropGet,
                    data: prop.handle,
                }),
                setter: prop.write.then_some(Trampoline {
                    op: TrampolineOp::PropSet,
                    data: prop.handle,
                }),
            },
        );
    }
    for field in &template.fields {
        ctx.define_property(
            target,
            &field.name,
            PropertySlot::Accessor {
                getter: Some(Trampoline {
                    op: TrampolineOp::FieldGet,
                    data: field.handle,
                }),
                setter: Some(Trampoline {
                    op: TrampolineOp::FieldSet,
                    data: field.handle,
                }),
            },
        );
    }
    // named indexed properties install a read-only accessor resolving the
    // cached intermediate object; indexing that object is the second layer
    for indexed in &template.indexed {
        ctx.define_property(
            target,
            &indexed.name,
            PropertySlot::Accessor {
                getter: Some(Trampoline {
                    op: TrampolineOp::IndexedObject,
                    data: indexed.handle,
                }),
                setter: None,
            },
        );
    }
    // the default indexed property bypasses the intermediate object:
    // indexing the instance itself dispatches directly
    if let Some(descriptor) = template.default_indexed {
        if let Some(obj) = ctx.object_mut(target) {
            obj.indexed_interceptor = Some(descriptor);
        }
    }
}
