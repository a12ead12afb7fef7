//! Managed shader programs grouped by application tag.
//!
//! The registry owns its programs. After the rendering context is recreated
//! the application calls [`ShaderRegistry::invalidate_all`] for its tag and
//! every program under it is rebuilt from its stored sources.

use std::collections::HashMap;

use slotmap::{new_key_type, SlotMap};

use crate::backend::SharedDevice;
use crate::error::GraphicsError;

use super::{ShaderConfig, ShaderProgram};

new_key_type! {
    /// Identifier of a program owned by a [`ShaderRegistry`].
    pub struct ShaderId;
}

struct ManagedShader {
    tag: String,
    program: ShaderProgram,
}

/// Arena of managed programs indexed by [`ShaderId`].
pub struct ShaderRegistry {
    device: SharedDevice,
    config: ShaderConfig,
    programs: SlotMap<ShaderId, ManagedShader>,
    by_tag: HashMap<String, Vec<ShaderId>>,
}

impl ShaderRegistry {
    /// Create an empty registry compiling with `config`.
    pub fn new(device: SharedDevice, config: ShaderConfig) -> Self {
        Self {
            device,
            config,
            programs: SlotMap::with_key(),
            by_tag: HashMap::new(),
        }
    }

    /// Configuration used by [`compile`](Self::compile).
    pub fn config(&self) -> &ShaderConfig {
        &self.config
    }

    /// Compile a program and register it under `tag`.
    ///
    /// Only a program that compiled is registered; otherwise the compiler
    /// log is returned as [`GraphicsError::ShaderCompilationFailed`].
    pub fn compile(
        &mut self,
        tag: &str,
        vertex: &str,
        fragment: &str,
    ) -> Result<ShaderId, GraphicsError> {
        let program = ShaderProgram::new(self.device.clone(), &self.config, vertex, fragment)?;
        self.insert(tag, program)
    }

    /// Register an already compiled program under `tag`.
    pub fn insert(&mut self, tag: &str, program: ShaderProgram) -> Result<ShaderId, GraphicsError> {
        if !program.is_compiled() {
            return Err(GraphicsError::ShaderCompilationFailed(
                program.log().to_string(),
            ));
        }
        let id = self.programs.insert(ManagedShader {
            tag: tag.to_string(),
            program,
        });
        self.by_tag.entry(tag.to_string()).or_default().push(id);
        log::debug!("Registered program {:?} under '{}'", id, tag);
        Ok(id)
    }

    pub fn get(&self, id: ShaderId) -> Option<&ShaderProgram> {
        self.programs.get(id).map(|m| &m.program)
    }

    pub fn get_mut(&mut self, id: ShaderId) -> Option<&mut ShaderProgram> {
        self.programs.get_mut(id).map(|m| &mut m.program)
    }

    pub fn contains(&self, id: ShaderId) -> bool {
        self.programs.contains_key(id)
    }

    /// Remove and drop a program, releasing its device objects.
    pub fn remove(&mut self, id: ShaderId) -> bool {
        let Some(managed) = self.programs.remove(id) else {
            return false;
        };
        if let Some(ids) = self.by_tag.get_mut(&managed.tag) {
            ids.retain(|other| *other != id);
            if ids.is_empty() {
                self.by_tag.remove(&managed.tag);
            }
        }
        true
    }

    /// Number of registered programs.
    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Programs registered under `tag`, in registration order.
    pub fn ids(&self, tag: &str) -> &[ShaderId] {
        self.by_tag.get(tag).map(Vec::as_slice).unwrap_or_default()
    }

    /// Tags with at least one program.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.by_tag.keys().map(String::as_str)
    }

    /// Invalidate and immediately recompile every program under `tag`.
    ///
    /// Returns how many programs compiled again.
    pub fn invalidate_all(&mut self, tag: &str) -> usize {
        let Some(ids) = self.by_tag.get(tag) else {
            return 0;
        };
        let mut compiled = 0;
        for id in ids {
            if let Some(managed) = self.programs.get_mut(*id) {
                managed.program.invalidate();
                managed.program.check_managed();
                if managed.program.is_compiled() {
                    compiled += 1;
                } else {
                    log::error!(
                        "Program {:?} under '{}' failed to recompile:\n{}",
                        id,
                        tag,
                        managed.program.log()
                    );
                }
            }
        }
        log::debug!("Recompiled {}/{} programs under '{}'", compiled, ids.len(), tag);
        compiled
    }

    /// Invalidate every program under `tag`; each recompiles at its next `begin()`.
    pub fn mark_invalidated(&mut self, tag: &str) -> usize {
        let Some(ids) = self.by_tag.get(tag) else {
            return 0;
        };
        for id in ids {
            if let Some(managed) = self.programs.get_mut(*id) {
                managed.program.invalidate();
            }
        }
        ids.len()
    }

    /// Drop every program under `tag`.
    pub fn clear_all(&mut self, tag: &str) {
        if let Some(ids) = self.by_tag.remove(tag) {
            for id in ids {
                self.programs.remove(id);
            }
        }
    }

    /// Drop every program.
    pub fn clear(&mut self) {
        self.programs.clear();
        self.by_tag.clear();
    }

    /// One-line summary of managed programs per tag.
    pub fn managed_status(&self) -> String {
        let mut tags: Vec<_> = self.by_tag.iter().collect();
        tags.sort_by(|a, b| a.0.cmp(b.0));
        let mut status = String::from("Managed shaders/app: {");
        for (tag, ids) in tags {
            status.push_str(&format!(" {}: {}", tag, ids.len()));
        }
        status.push_str(" }");
        status
    }
}

impl std::fmt::Debug for ShaderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderRegistry")
            .field("programs", &self.programs.len())
            .field("tags", &self.by_tag.len())
            .finish()
    }
}
