//! Object and dispatch-table layout
//!
//! One pass over all declared classes assigns every field a byte offset
//! within its instance, every method a slot in its class's dispatch table,
//! and emits the static dispatch-table data. The pass runs before any method
//! body is generated, since a body may reference offsets of classes declared
//! later in the unit.
//!
//! Layout rules:
//! - Within one class, fields and methods are ordered alphabetically.
//! - Across the inheritance chain, ancestors' own members come first
//!   (root-most first), descendants' own members are appended.
//! - An overriding method keeps the slot of the ancestor definition it
//!   overrides; its table entry points at the overriding implementation.
//! - Fields are keyed by name only, so a same-named field in a subclass
//!   shares the ancestor's slot.
//! - Offsets start at one word, not zero: instance word 0 holds the
//!   dispatch-table pointer, table word 0 holds the superclass table pointer
//!   (the literal 0 for `Object`).

use crate::error::CodegenError;
use crate::CodeGenerator;
use log::debug;
use opal_ir::{ClassDecl, Program, OBJECT_CLASS};
use std::collections::HashMap;
use std::fmt;

/// Offsets for one class: fields relative to the instance pointer, methods
/// relative to the dispatch-table pointer, and per-method locals relative to
/// the frame pointer.
#[derive(Debug, Clone, Default)]
pub struct ClassLayout {
    field_offsets: HashMap<String, i32>,
    method_offsets: HashMap<String, i32>,
    local_offsets: HashMap<String, HashMap<String, i32>>,
}

impl ClassLayout {
    pub fn field_offset(&self, field: &str) -> Option<i32> {
        self.field_offsets.get(field).copied()
    }

    pub fn method_offset(&self, method: &str) -> Option<i32> {
        self.method_offsets.get(method).copied()
    }

    pub fn local_offset(&self, method: &str, local: &str) -> Option<i32> {
        self.local_offsets.get(method)?.get(local).copied()
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.field_offsets.contains_key(field)
    }

    pub fn field_count(&self) -> usize {
        self.field_offsets.len()
    }

    pub(crate) fn add_field(&mut self, field: &str, offset: i32) {
        self.field_offsets.insert(field.to_string(), offset);
    }

    pub(crate) fn add_method(&mut self, method: &str, offset: i32) {
        self.method_offsets.insert(method.to_string(), offset);
    }

    pub(crate) fn add_local(&mut self, method: &str, local: &str, offset: i32) {
        self.local_offsets
            .entry(method.to_string())
            .or_default()
            .insert(local.to_string(), offset);
    }
}

/// Per-class declaration facts the layout pass works from.
#[derive(Debug, Clone)]
pub(crate) struct ClassInfo {
    pub(crate) superclass: String,
    /// The class's own fields, alphabetically.
    fields: Vec<String>,
    /// The class's own methods, alphabetically.
    methods: Vec<String>,
}

/// One dispatch-table slot: the method name and the class whose
/// implementation fills the slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MethodSlot {
    pub(crate) name: String,
    pub(crate) defining_class: String,
}

impl fmt::Display for MethodSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.defining_class, self.name)
    }
}

impl<W: fmt::Write> CodeGenerator<'_, W> {
    pub(crate) fn collect_class_info(&mut self, program: &Program) {
        for class in &program.classes {
            let mut fields: Vec<String> =
                class.fields.iter().map(|f| f.name.clone()).collect();
            fields.sort();
            let mut methods: Vec<String> =
                class.methods.iter().map(|m| m.name.clone()).collect();
            methods.sort();
            self.class_info.insert(
                class.name.clone(),
                ClassInfo {
                    superclass: class.superclass.clone(),
                    fields,
                    methods,
                },
            );
        }
    }

    fn class_info(&self, class: &str) -> Result<&ClassInfo, CodegenError> {
        self.class_info
            .get(class)
            .ok_or_else(|| CodegenError::UnknownClass(class.to_string()))
    }

    pub(crate) fn superclass_of(&self, class: &str) -> Result<String, CodegenError> {
        Ok(self.class_info(class)?.superclass.clone())
    }

    /// All fields of `class` in layout order: the root-most ancestor's own
    /// fields first, each class block alphabetical, shadowed names collapsed
    /// into the ancestor's slot.
    pub(crate) fn fields_in_order(&self, class: &str) -> Result<Vec<String>, CodegenError> {
        let info = self.class_info(class)?;
        let own = info.fields.clone();
        if info.superclass == OBJECT_CLASS {
            return Ok(own);
        }
        let mut table = self.fields_in_order(&info.superclass)?;
        for field in own {
            if !table.contains(&field) {
                table.push(field);
            }
        }
        Ok(table)
    }

    /// All dispatch-table slots of `class` in layout order. An override
    /// replaces the ancestor's slot in place; new methods are appended.
    pub(crate) fn methods_in_order(&self, class: &str) -> Result<Vec<MethodSlot>, CodegenError> {
        let info = self.class_info(class)?;
        let own: Vec<MethodSlot> = info
            .methods
            .iter()
            .map(|name| MethodSlot {
                name: name.clone(),
                defining_class: class.to_string(),
            })
            .collect();
        if info.superclass == OBJECT_CLASS {
            return Ok(own);
        }
        let mut table = self.methods_in_order(&info.superclass)?;
        for slot in own {
            if let Some(inherited) = table.iter_mut().find(|t| t.name == slot.name) {
                *inherited = slot;
            } else {
                table.push(slot);
            }
        }
        Ok(table)
    }

    /// Emits every dispatch table and records all field/method offsets.
    ///
    /// `Object`'s table comes first: it anchors the cast validator's chain
    /// walk, so its address must be defined before first use. The four
    /// primitive array tables follow so casts from `Object` to e.g. `int[]`
    /// can be validated like any other.
    pub(crate) fn emit_dispatch_tables(&mut self, program: &Program) -> Result<(), CodegenError> {
        let data_section = self.config.data_section.clone();
        self.emit("")?;
        self.emit(&data_section)?;
        self.emit_section_comment("DispatchTables")?;

        // Object's table has no methods; the superclass word 0 is its only
        // entry and keeps the label distinct from the next table's.
        self.emit_vtable(OBJECT_CLASS, None, &[])?;
        self.layouts.entry(OBJECT_CLASS.to_string()).or_default();

        for elem in ["float", "boolean", "int", OBJECT_CLASS] {
            let name = format!("{}_Array", elem);
            self.emit_vtable(&name, Some(OBJECT_CLASS), &[])?;
            self.layouts.entry(name).or_default();
        }

        for class in &program.classes {
            self.lay_out_class(class)?;
        }
        Ok(())
    }

    fn lay_out_class(&mut self, class: &ClassDecl) -> Result<(), CodegenError> {
        debug!("laying out class {}", class.name);
        let word = self.word();
        let slots = self.methods_in_order(&class.name)?;
        self.emit_vtable(&class.name, Some(class.superclass.as_str()), &slots)?;

        let layout = self.layouts.entry(class.name.clone()).or_default();
        let mut offset = word; // table slot 0 is the superclass pointer
        for slot in &slots {
            layout.add_method(&slot.name, offset);
            offset += word;
        }

        let fields = self.fields_in_order(&class.name)?;
        let layout = self.layouts.entry(class.name.clone()).or_default();
        let mut offset = word; // instance word 0 is the dispatch-table pointer
        for field in &fields {
            layout.add_field(field, offset);
            offset += word;
        }

        // Array-of-this-class table, referenced by casts and allocations.
        let array_name = format!("{}_Array", class.name);
        self.emit_vtable(&array_name, Some(OBJECT_CLASS), &[])?;
        self.layouts.entry(array_name).or_default();
        Ok(())
    }

    fn emit_vtable(
        &mut self,
        type_name: &str,
        superclass: Option<&str>,
        slots: &[MethodSlot],
    ) -> Result<(), CodegenError> {
        self.emit_label(&format!("vtable_{}", type_name))?;
        match superclass {
            Some(superclass) => {
                let word = format!("vtable_{}", superclass);
                self.emit_word_data(&word)?;
            }
            None => self.emit_word_data("0")?,
        }
        for slot in slots {
            self.emit_word_data(&slot.to_string())?;
        }
        Ok(())
    }

    // Layout lookups used by the generators. Missing entries mean the front
    // end broke its guarantees; they fail the compilation with a diagnostic
    // naming the symbol.

    pub(crate) fn layout(&self, class: &str) -> Result<&ClassLayout, CodegenError> {
        self.layouts
            .get(class)
            .ok_or_else(|| CodegenError::UnknownClass(class.to_string()))
    }

    pub(crate) fn field_offset_of(&self, class: &str, field: &str) -> Result<i32, CodegenError> {
        self.layout(class)?
            .field_offset(field)
            .ok_or_else(|| CodegenError::UnknownField {
                class: class.to_string(),
                field: field.to_string(),
            })
    }

    pub(crate) fn method_offset_of(&self, class: &str, method: &str) -> Result<i32, CodegenError> {
        self.layout(class)?
            .method_offset(method)
            .ok_or_else(|| CodegenError::UnknownMethod {
                class: class.to_string(),
                method: method.to_string(),
            })
    }

    /// Frame offset of a local in the method currently being generated, or
    /// `None` when the name is not a local there.
    pub(crate) fn current_local_offset(&self, name: &str) -> Option<i32> {
        self.layouts
            .get(&self.current_class)?
            .local_offset(&self.current_method, name)
    }

    pub(crate) fn this_offset(&self) -> Result<i32, CodegenError> {
        self.current_local_offset("this")
            .ok_or_else(|| CodegenError::UnknownLocal {
                class: self.current_class.clone(),
                method: self.current_method.clone(),
                local: "this".to_string(),
            })
    }

    pub(crate) fn add_current_local(&mut self, name: &str, offset: i32) {
        let class = self.current_class.clone();
        let method = self.current_method.clone();
        self.layouts
            .entry(class)
            .or_default()
            .add_local(&method, name, offset);
    }
}
