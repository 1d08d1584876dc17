//! Ordered, named processing stages attached to a connection.
//!
//! Stages are stored type-erased; callers that installed a stage retrieve it
//! again by name and concrete type.

use std::any::Any;

use thiserror::Error;

pub type Stage = Box<dyn Any + Send>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("duplicate stage name: {0}")]
    DuplicateName(String),

    #[error("no stage named {0}")]
    NoSuchStage(String),

    #[error("stage {0} has an unexpected type")]
    TypeMismatch(String),
}

#[derive(Default)]
pub struct Pipeline {
    stages: Vec<(String, Stage)>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_last<T: Any + Send>(
        &mut self,
        name: impl Into<String>,
        stage: T,
    ) -> Result<(), PipelineError> {
        let name = self.check_unique(name.into())?;
        self.stages.push((name, Box::new(stage)));
        Ok(())
    }

    pub fn add_first<T: Any + Send>(
        &mut self,
        name: impl Into<String>,
        stage: T,
    ) -> Result<(), PipelineError> {
        let name = self.check_unique(name.into())?;
        self.stages.insert(0, (name, Box::new(stage)));
        Ok(())
    }

    /// Insert `stage` immediately before the stage called `base`.
    pub fn add_before<T: Any + Send>(
        &mut self,
        base: &str,
        name: impl Into<String>,
        stage: T,
    ) -> Result<(), PipelineError> {
        let name = self.check_unique(name.into())?;
        let idx = self.index_of(base)?;
        self.stages.insert(idx, (name, Box::new(stage)));
        Ok(())
    }

    /// Insert `stage` immediately after the stage called `base`.
    pub fn add_after<T: Any + Send>(
        &mut self,
        base: &str,
        name: impl Into<String>,
        stage: T,
    ) -> Result<(), PipelineError> {
        let name = self.check_unique(name.into())?;
        let idx = self.index_of(base)?;
        self.stages.insert(idx + 1, (name, Box::new(stage)));
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<Stage, PipelineError> {
        let idx = self.index_of(name)?;
        Ok(self.stages.remove(idx).1)
    }

    pub fn get_mut<T: Any>(&mut self, name: &str) -> Result<&mut T, PipelineError> {
        let idx = self.index_of(name)?;
        self.stages[idx]
            .1
            .downcast_mut::<T>()
            .ok_or_else(|| PipelineError::TypeMismatch(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.stages.iter().any(|(n, _)| n == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    fn index_of(&self, name: &str) -> Result<usize, PipelineError> {
        self.stages
            .iter()
            .position(|(n, _)| n == name)
            .ok_or_else(|| PipelineError::NoSuchStage(name.to_string()))
    }

    fn check_unique(&self, name: String) -> Result<String, PipelineError> {
        if self.contains(&name) {
            return Err(PipelineError::DuplicateName(name));
        }
        Ok(name)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
