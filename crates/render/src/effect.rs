use crate::device::{Device, DeviceError};
use crate::resource::{Effect, EffectDesc};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Compile-once cache of shader programs, keyed by effect name.
///
/// A name is bound to the descriptor it was first compiled from; asking for
/// the same name with a different descriptor is [`DeviceError::EffectConflict`].
///
/// Shared between the drawing system and the resource factory; renderers
/// reach it through the factory when their effects are built.
#[derive(Debug)]
pub struct EffectPool {
    device: Rc<dyn Device>,
    effects: RefCell<BTreeMap<String, (EffectDesc, Rc<Effect>)>>,
}

impl EffectPool {
    pub fn new(device: Rc<dyn Device>) -> Self {
        Self {
            device,
            effects: RefCell::new(BTreeMap::new()),
        }
    }

    /// Return the cached effect named `desc.name`, compiling it on first use.
    pub fn get_or_compile(&self, desc: &EffectDesc) -> Result<Rc<Effect>, DeviceError> {
        if let Some((cached, effect)) = self.effects.borrow().get(&desc.name) {
            if cached != desc {
                tracing::warn!(effect = %desc.name, "effect name reused with a different descriptor");
                return Err(DeviceError::EffectConflict(desc.name.clone()));
            }
            tracing::trace!(effect = %desc.name, "effect cache hit");
            return Ok(Rc::clone(effect));
        }
        let effect = self.device.compile_effect(desc)?;
        tracing::debug!(effect = %desc.name, "effect compiled");
        self.effects
            .borrow_mut()
            .insert(desc.name.clone(), (desc.clone(), Rc::clone(&effect)));
        Ok(effect)
    }

    pub fn get(&self, name: &str) -> Option<Rc<Effect>> {
        self.effects
            .borrow()
            .get(name)
            .map(|(_, effect)| Rc::clone(effect))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.effects.borrow().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.effects.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.effects.borrow_mut().clear();
    }
}
