use crate::engine::{ManagedValue, NativeCallbackId};
use crate::error::{BridgeError, Violation};

/// Identifier of a template owned by an isolate.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(transparent)]
pub struct TemplateId(pub(crate) u32);

/// A property installed by a template on every instance it produces.
#[derive(Clone, Debug)]
pub enum TemplateProperty {
  /// A plain value, copied onto each instance.
  Value(ManagedValue),
  /// A nested template, instantiated per instance (native-backed methods, sub-objects).
  Template(TemplateId),
}

/// What a template describes.
#[derive(Clone, Debug)]
pub(crate) enum TemplateShape {
  /// A native-backed function plus its properties.
  Function {
    name: String,
    callback: NativeCallbackId,
  },
  /// A plain object layout.
  Object,
}

/// A native-side descriptor used to construct managed objects with native-callable behavior.
///
/// Templates are mutable while being defined and become immutable ("sealed") on first
/// instantiation; later mutation fails with [`Violation::TemplateSealed`].
#[derive(Clone, Debug)]
pub(crate) struct Template {
  pub shape: TemplateShape,
  pub properties: Vec<(String, TemplateProperty)>,
  pub sealed: bool,
}

/// Templates created within one isolate, addressed by [`TemplateId`].
#[derive(Default, Debug)]
pub(crate) struct TemplateStore {
  templates: Vec<Template>,
}

/// Instantiation recursion bound; nested templates deeper than this (or a template cycle) fail.
pub(crate) const MAX_TEMPLATE_DEPTH: u32 = 32;

impl TemplateStore {
  pub fn define(&mut self, shape: TemplateShape) -> TemplateId {
    let id = TemplateId(self.templates.len() as u32);
    self.templates.push(Template {
      shape,
      properties: Vec::new(),
      sealed: false,
    });
    id
  }

  pub fn get(&self, id: TemplateId) -> Result<&Template, BridgeError> {
    self
      .templates
      .get(id.0 as usize)
      .ok_or_else(|| Violation::UnknownTemplate.into())
  }

  /// Adds a property to a not-yet-sealed template.
  pub fn set_property(
    &mut self,
    id: TemplateId,
    key: &str,
    property: TemplateProperty,
  ) -> Result<(), BridgeError> {
    let template = self
      .templates
      .get_mut(id.0 as usize)
      .ok_or(Violation::UnknownTemplate)?;
    if template.sealed {
      return Err(Violation::TemplateSealed.into());
    }
    template.properties.push((key.to_string(), property));
    Ok(())
  }

  /// Seals `id` and returns a copy of its definition for instantiation.
  pub fn seal(&mut self, id: TemplateId) -> Result<Template, BridgeError> {
    let template = self
      .templates
      .get_mut(id.0 as usize)
      .ok_or(Violation::UnknownTemplate)?;
    template.sealed = true;
    Ok(template.clone())
  }

  pub fn is_sealed(&self, id: TemplateId) -> Result<bool, BridgeError> {
    self.get(id).map(|template| template.sealed)
  }
}
