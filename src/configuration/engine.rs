//! Configuration step engine
//!
//! Walks the operator through the numbered step files of a vehicle
//! directory. For the active step it joins the file contents, the step's
//! forced and derived overrides, the live flight controller values and
//! the parameter documentation into one [`ArduPilotParameter`] per name.
//!
//! An upload cycle runs strictly in order: write every selected
//! parameter, reset the flight controller if needed and wait for it to
//! boot, re-download, then compare. Mismatches are collected in the
//! [`UploadReport`], never raised.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use ardu_configurator_core::configuration::{
    reset_wait_seconds, ArduPilotParameter, ChangeTracker, OverrideKind, ParameterEditError,
    ParameterOverride, ResetPolicy, ResetRequirement, ValueWarning, WorkflowState,
};
use ardu_configurator_core::parameters::{
    validate_name, CategorizedParameters, ExportDialect, ParameterRecord, ParameterSet, Tolerance,
};
use ardu_configurator_core::traits::{ParamTransport, TimeSource};

use super::filesystem::VehicleDirectory;
use super::operator::OperatorInterface;
use super::registry::{PluginRegistry, StepPlugin};
use crate::communication::mavlink::ProtocolClient;
use crate::core::Settings;
use crate::error::{EngineError, FilesystemError};

/// Flight controller boot delay in milliseconds
pub const BOOT_DELAY_PARAMETER: &str = "BRD_BOOT_DELAY";

/// Uploaded value the flight controller does not report back
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterMismatch {
    pub name: String,
    pub expected: f64,
    /// `None` if the parameter was missing from the re-download
    pub actual: Option<f64>,
}

/// Outcome of one upload-verify cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadReport {
    /// Parameters written to the link
    pub uploaded: Vec<String>,
    /// Parameters that could not be written, with the reason
    pub send_failures: Vec<(String, String)>,
    /// Written parameters whose re-downloaded value differs
    pub mismatches: Vec<ParameterMismatch>,
    /// Strongest reset requirement among the changed parameters
    pub reset_requirement: ResetRequirement,
    pub reset_performed: bool,
}

impl UploadReport {
    /// True if every parameter was written and verified
    pub fn is_success(&self) -> bool {
        self.send_failures.is_empty() && self.mismatches.is_empty()
    }

    /// Names to send again
    pub fn failed_parameters(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .send_failures
            .iter()
            .map(|(name, _)| name.clone())
            .chain(self.mismatches.iter().map(|m| m.name.clone()))
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

/// Drives the step-by-step configuration of one vehicle
pub struct ConfigurationStepEngine<T: ParamTransport, C: TimeSource> {
    client: ProtocolClient<T, C>,
    vehicle: VehicleDirectory,
    operator: Box<dyn OperatorInterface>,
    plugins: Arc<PluginRegistry>,
    tolerance: Tolerance,
    reset_policy: ResetPolicy,
    prefer_bulk: bool,
    state: WorkflowState,
    current_file: Option<String>,
    parameters: BTreeMap<String, ArduPilotParameter>,
    // Deleted in this step, restored if added again
    removed: BTreeMap<String, ArduPilotParameter>,
    changes: ChangeTracker,
    fc_parameters: ParameterSet,
    fc_defaults: ParameterSet,
    active_plugin: Option<Box<dyn StepPlugin>>,
    override_errors: Vec<ParameterEditError>,
}

impl<T: ParamTransport, C: TimeSource> ConfigurationStepEngine<T, C> {
    pub fn new(
        client: ProtocolClient<T, C>,
        vehicle: VehicleDirectory,
        operator: Box<dyn OperatorInterface>,
        plugins: Arc<PluginRegistry>,
        settings: &Settings,
    ) -> Self {
        Self {
            client,
            vehicle,
            operator,
            plugins,
            tolerance: settings.tolerance(),
            reset_policy: settings.reset_policy(),
            prefer_bulk: settings.prefer_bulk_download,
            state: WorkflowState::Idle,
            current_file: None,
            parameters: BTreeMap::new(),
            removed: BTreeMap::new(),
            changes: ChangeTracker::new(),
            fc_parameters: ParameterSet::new(),
            fc_defaults: ParameterSet::new(),
            active_plugin: None,
            override_errors: Vec::new(),
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    /// Active step file name
    pub fn current_file(&self) -> Option<&str> {
        self.current_file.as_deref()
    }

    pub fn parameter(&self, name: &str) -> Option<&ArduPilotParameter> {
        self.parameters.get(name)
    }

    /// Parameters of the active step in name order
    pub fn parameters(&self) -> impl Iterator<Item = &ArduPilotParameter> {
        self.parameters.values()
    }

    pub fn fc_parameters(&self) -> &ParameterSet {
        &self.fc_parameters
    }

    pub fn fc_defaults(&self) -> &ParameterSet {
        &self.fc_defaults
    }

    /// Additions and deletions since the step was loaded or last saved
    pub fn changes(&self) -> &ChangeTracker {
        &self.changes
    }

    /// Overrides rejected while loading the active step
    pub fn override_errors(&self) -> &[ParameterEditError] {
        &self.override_errors
    }

    pub fn active_plugin(&self) -> Option<&str> {
        self.active_plugin.as_ref().map(|p| p.name())
    }

    pub fn vehicle(&self) -> &VehicleDirectory {
        &self.vehicle
    }

    pub fn client(&self) -> &ProtocolClient<T, C> {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut ProtocolClient<T, C> {
        &mut self.client
    }

    fn transition(&mut self, to: WorkflowState) -> Result<(), EngineError> {
        if !self.state.can_transition_to(to) {
            return Err(EngineError::InvalidState {
                from: self.state,
                to,
            });
        }
        crate::log_debug!("Workflow {} -> {}", self.state, to);
        self.state = to;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Flight controller snapshot
    // ------------------------------------------------------------------

    /// Download every flight controller parameter
    ///
    /// Returns the number of parameters. Defaults come from the flight
    /// controller when it provides them, else from `00_default.param`.
    pub fn download_fc_parameters(
        &mut self,
        progress: &mut dyn FnMut(usize, usize),
    ) -> Result<usize, EngineError> {
        let (values, defaults) = self.client.download_all(self.prefer_bulk, progress)?;
        self.store_fc_parameters(values, defaults);
        Ok(self.fc_parameters.len())
    }

    fn store_fc_parameters(&mut self, values: ParameterSet, defaults: ParameterSet) {
        if !defaults.is_empty() {
            self.fc_defaults = defaults;
        } else if self.fc_defaults.is_empty() {
            match self.vehicle.read_defaults() {
                Ok(Some(file_defaults)) => {
                    crate::log_info!("Using {} defaults from the vehicle directory", file_defaults.len());
                    self.fc_defaults = file_defaults;
                }
                Ok(None) => crate::log_warn!("No parameter defaults available"),
                Err(e) => crate::log_warn!("Cannot read parameter defaults: {}", e),
            }
        }
        for param in self.parameters.values_mut() {
            param.set_fc_value(values.value(param.name()));
        }
        self.fc_parameters = values;
    }

    /// Write `complete.param`, `00_default.param` and the three
    /// non-default category files from the last download
    pub fn export_fc_snapshot(&self) -> Result<CategorizedParameters, EngineError> {
        if self.fc_parameters.is_empty() {
            crate::log_warn!("Exporting an empty flight controller snapshot");
        }
        self.vehicle.write_complete(&self.fc_parameters)?;
        if !self.fc_defaults.is_empty() {
            self.vehicle.write_defaults(&self.fc_defaults)?;
        }
        Ok(self
            .vehicle
            .write_categorized(&self.fc_parameters, &self.fc_defaults, self.tolerance)?)
    }

    // ------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------

    /// Load a step file, asking before unsaved changes are dropped
    pub fn load_step(&mut self, file: &str) -> Result<(), EngineError> {
        self.confirm_leave()?;
        self.open_step(file)
    }

    fn confirm_leave(&mut self) -> Result<(), EngineError> {
        if !self.has_unsaved_changes() {
            return Ok(());
        }
        let file = self.current_file.clone().unwrap_or_default();
        let message = format!("{} has unsaved changes. Discard them?", file);
        if self.operator.ask_confirmation("Unsaved changes", &message) {
            crate::log_info!("Discarding unsaved changes in {}", file);
            Ok(())
        } else {
            Err(EngineError::UnsavedChanges(file))
        }
    }

    fn open_step(&mut self, file: &str) -> Result<(), EngineError> {
        if !self.state.can_transition_to(WorkflowState::StepLoaded) {
            return Err(EngineError::InvalidState {
                from: self.state,
                to: WorkflowState::StepLoaded,
            });
        }
        let params = self.vehicle.read_params(file)?;
        let meta = self.vehicle.step_metadata(file);
        let forced = meta.forced_overrides(file)?;
        let derived = meta.derived_overrides(file, &self.fc_parameters)?;

        self.deactivate_plugin();
        self.parameters.clear();
        self.removed.clear();
        self.changes.clear();
        self.override_errors.clear();

        for (name, record) in params.iter() {
            let kind = if forced.iter().any(|(n, _)| n == name) {
                Some(OverrideKind::Forced)
            } else if derived.iter().any(|(n, _)| n == name) {
                Some(OverrideKind::Derived)
            } else {
                None
            };
            let param = self.build_parameter(name, record.clone(), kind);
            self.parameters.insert(name.to_string(), param);
        }
        for (name, ov) in forced.into_iter().chain(derived) {
            self.apply_step_override(file, name, ov);
        }

        if let Some(plugin) = &meta.plugin {
            self.activate_plugin(plugin, file);
        }
        self.current_file = Some(file.to_string());
        self.transition(WorkflowState::StepLoaded)?;
        crate::log_info!(
            "Loaded {}: {} parameters, {} rejected overrides",
            file,
            self.parameters.len(),
            self.override_errors.len()
        );
        Ok(())
    }

    fn build_parameter(
        &self,
        name: &str,
        base: ParameterRecord,
        kind: Option<OverrideKind>,
    ) -> ArduPilotParameter {
        let doc = self
            .vehicle
            .documentation()
            .get(name)
            .cloned()
            .unwrap_or_default();
        ArduPilotParameter::new(
            name,
            base,
            self.fc_parameters.value(name),
            self.fc_defaults.value(name),
            doc,
            kind,
        )
        .with_tolerance(self.tolerance)
    }

    /// Apply one forced or derived value; rejections are logged and kept
    fn apply_step_override(&mut self, file: &str, name: String, ov: ParameterOverride) {
        let result = match self.parameters.get_mut(&name) {
            Some(param) => param.apply_override(ov),
            None => {
                // Not in the file yet: start from the flight controller value
                let base = self.fc_parameters.value(&name).unwrap_or(ov.value);
                let mut param = self.build_parameter(&name, ParameterRecord::new(base), Some(ov.kind));
                let result = param.apply_override(ov);
                if result.is_ok() {
                    self.parameters.insert(name, param);
                }
                result
            }
        };
        if let Err(e) = result {
            crate::log_error!("Skipping override in {}: {}", file, e);
            self.override_errors.push(e);
        }
    }

    fn activate_plugin(&mut self, name: &str, file: &str) {
        let fc_parameters = &self.fc_parameters;
        let result = self.plugins.create(name).and_then(|mut plugin| {
            plugin.activate(file, fc_parameters)?;
            Ok(plugin)
        });
        match result {
            Ok(plugin) => {
                crate::log_info!("Plugin {} active for {}", name, file);
                self.active_plugin = Some(plugin);
            }
            Err(e) => {
                crate::log_error!("Cannot activate plugin {}: {}", name, e);
                self.operator.show_warning("Plugin", &e.to_string());
            }
        }
    }

    fn deactivate_plugin(&mut self) {
        if let Some(mut plugin) = self.active_plugin.take() {
            crate::log_debug!("Deactivating plugin {}", plugin.name());
            plugin.deactivate();
        }
    }

    // ------------------------------------------------------------------
    // Editing
    // ------------------------------------------------------------------

    /// Unsaved value, comment, override, addition or deletion
    pub fn has_unsaved_changes(&self) -> bool {
        self.changes.has_structural_changes()
            || self.parameters.values().any(ArduPilotParameter::is_dirty)
    }

    fn begin_edit(&self) -> Result<(), EngineError> {
        if self.current_file.is_none() {
            return Err(EngineError::NoStepLoaded);
        }
        if !self.state.can_transition_to(WorkflowState::Editing) {
            return Err(EngineError::InvalidState {
                from: self.state,
                to: WorkflowState::Editing,
            });
        }
        Ok(())
    }

    fn refresh_state(&mut self) {
        let next = if self.has_unsaved_changes() {
            WorkflowState::Editing
        } else {
            WorkflowState::StepLoaded
        };
        if next != self.state {
            crate::log_debug!("Workflow {} -> {}", self.state, next);
            self.state = next;
        }
    }

    fn parameter_mut(&mut self, name: &str) -> Result<&mut ArduPilotParameter, EngineError> {
        self.parameters
            .get_mut(name)
            .ok_or_else(|| EngineError::UnknownParameter(name.to_string()))
    }

    /// Change a value
    ///
    /// Out-of-range and bitmask problems are returned as warnings; the
    /// value is still applied.
    pub fn set_new_value(&mut self, name: &str, value: f64) -> Result<Vec<ValueWarning>, EngineError> {
        self.begin_edit()?;
        let param = self.parameter_mut(name)?;
        let warnings = param.value_warnings(value);
        let changed = param.set_new_value(value)?;
        for warning in &warnings {
            crate::log_warn!("{}: {}", name, warning);
        }
        if changed {
            self.changes.record_edit(name);
        }
        self.refresh_state();
        Ok(warnings)
    }

    /// Change a value given as text: a number or a documented value label
    pub fn set_new_value_text(
        &mut self,
        name: &str,
        text: &str,
    ) -> Result<Vec<ValueWarning>, EngineError> {
        let value = self.parse_value_text(name, text)?;
        self.set_new_value(name, value)
    }

    fn parse_value_text(&self, name: &str, text: &str) -> Result<f64, EngineError> {
        let text = text.trim();
        if let Ok(value) = text.parse::<f64>() {
            if value.is_finite() {
                return Ok(value);
            }
        }
        let param = self
            .parameters
            .get(name)
            .ok_or_else(|| EngineError::UnknownParameter(name.to_string()))?;
        param
            .doc()
            .values
            .iter()
            .find(|(_, label)| label.eq_ignore_ascii_case(text))
            .map(|(value, _)| *value as f64)
            .ok_or_else(|| EngineError::InvalidValue {
                name: name.to_string(),
                text: text.to_string(),
            })
    }

    /// Replace the change reason of a parameter
    pub fn set_comment(&mut self, name: &str, comment: &str) -> Result<(), EngineError> {
        self.begin_edit()?;
        let param = self.parameter_mut(name)?;
        param.set_comment(comment);
        if param.is_dirty() {
            self.changes.record_edit(name);
        }
        self.refresh_state();
        Ok(())
    }

    /// Add a parameter to the active step
    ///
    /// Starts from the flight controller value, then the default, then 0.
    pub fn add_parameter(&mut self, name: &str) -> Result<(), EngineError> {
        self.begin_edit()?;
        validate_name(name)?;
        if self.parameters.contains_key(name) {
            return Err(EngineError::DuplicateParameter(name.to_string()));
        }
        let param = match self.removed.remove(name) {
            Some(param) => param,
            None => {
                if !self.fc_parameters.is_empty() && !self.fc_parameters.contains(name) {
                    crate::log_warn!("{} is unknown to the flight controller", name);
                }
                let value = self
                    .fc_parameters
                    .value(name)
                    .or_else(|| self.fc_defaults.value(name))
                    .unwrap_or(0.0);
                self.build_parameter(name, ParameterRecord::new(value), None)
            }
        };
        self.parameters.insert(name.to_string(), param);
        self.changes.record_add(name);
        self.refresh_state();
        Ok(())
    }

    /// Remove a parameter from the active step
    pub fn delete_parameter(&mut self, name: &str) -> Result<(), EngineError> {
        self.begin_edit()?;
        let param = self
            .parameters
            .remove(name)
            .ok_or_else(|| EngineError::UnknownParameter(name.to_string()))?;
        if let Some(kind) = param.override_kind() {
            crate::log_warn!("Deleting {} parameter {}", kind, name);
        }
        self.removed.insert(name.to_string(), param);
        self.changes.record_delete(name);
        self.refresh_state();
        Ok(())
    }

    fn step_parameter_set(&self) -> ParameterSet {
        let mut set = ParameterSet::new();
        for (name, param) in &self.parameters {
            set.insert(name.as_str(), param.effective_record());
        }
        set
    }

    /// Write the active step back to its file
    ///
    /// The written file becomes the new baseline: edits are committed and
    /// the change tracker is cleared, so afterwards
    /// [`has_unsaved_changes`](Self::has_unsaved_changes) is false and
    /// [`changes`](Self::changes) only records what happens after the save.
    pub fn save_step(&mut self) -> Result<(), EngineError> {
        let file = self.current_file.clone().ok_or(EngineError::NoStepLoaded)?;
        if self.state.is_busy() {
            return Err(EngineError::InvalidState {
                from: self.state,
                to: WorkflowState::StepLoaded,
            });
        }
        let set = self.step_parameter_set();
        self.vehicle.write_params(&file, &set, &ExportDialect::Compact)?;
        for param in self.parameters.values_mut() {
            param.commit();
        }
        self.removed.clear();
        self.changes.clear();
        self.refresh_state();
        crate::log_info!("Saved {} parameters to {}", set.len(), file);
        Ok(())
    }

    /// Reload the active step from disk
    pub fn discard_changes(&mut self) -> Result<(), EngineError> {
        let file = self.current_file.clone().ok_or(EngineError::NoStepLoaded)?;
        self.open_step(&file)
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    /// Load the step after the active one
    ///
    /// Returns `None` and enters `Completed` after the last step.
    pub fn next_step(&mut self) -> Result<Option<String>, EngineError> {
        let files = self.vehicle.step_files()?;
        let next = match &self.current_file {
            Some(current) => files.iter().find(|f| f.as_str() > current.as_str()),
            None => files.first(),
        }
        .cloned();
        self.confirm_leave()?;
        match next {
            Some(file) => {
                self.open_step(&file)?;
                Ok(Some(file))
            }
            None => {
                self.complete()?;
                Ok(None)
            }
        }
    }

    fn complete(&mut self) -> Result<(), EngineError> {
        if self.state == WorkflowState::Editing {
            self.transition(WorkflowState::StepLoaded)?;
        }
        self.transition(WorkflowState::Completed)?;
        self.deactivate_plugin();
        self.parameters.clear();
        self.removed.clear();
        self.changes.clear();
        self.current_file = None;
        crate::log_info!("All configuration steps processed");
        Ok(())
    }

    /// Move past an optional step
    pub fn skip_step(&mut self) -> Result<Option<String>, EngineError> {
        let file = self.current_file.clone().ok_or(EngineError::NoStepLoaded)?;
        let meta = self.vehicle.step_metadata(&file);
        if !meta.can_skip() {
            return Err(EngineError::MandatoryStep {
                file,
                percent: meta.mandatory_percent,
            });
        }
        crate::log_info!("Skipping optional step {}", file);
        self.next_step()
    }

    /// Load a specific step file
    pub fn jump_to(&mut self, file: &str) -> Result<(), EngineError> {
        if !self.vehicle.step_files()?.iter().any(|f| f == file) {
            return Err(FilesystemError::StepNotFound(file.to_string()).into());
        }
        self.load_step(file)
    }

    /// Load the step after the one uploaded last
    ///
    /// Starts at the first step if nothing was uploaded yet and stays on
    /// the last step if that was the one uploaded.
    pub fn resume_step(&mut self) -> Result<Option<String>, EngineError> {
        let files = self.vehicle.step_files()?;
        let last = self
            .vehicle
            .last_uploaded()
            .and_then(|last| files.iter().position(|f| *f == last));
        let target = match last {
            Some(i) => files.get(i + 1).or_else(|| files.get(i)),
            None => files.first(),
        };
        let Some(target) = target.cloned() else {
            crate::log_warn!("No configuration steps in {}", self.vehicle.root().display());
            return Ok(None);
        };
        self.load_step(&target)?;
        Ok(Some(target))
    }

    // ------------------------------------------------------------------
    // Upload
    // ------------------------------------------------------------------

    /// Writable parameters whose value differs from the flight controller
    pub fn parameters_to_upload(&self) -> Vec<String> {
        self.parameters
            .values()
            .filter(|p| !p.doc().is_read_only() && p.differs_from_fc())
            .map(|p| p.name().to_string())
            .collect()
    }

    /// Upload `selected`, reset if needed, re-download and compare
    pub fn upload(
        &mut self,
        selected: &[String],
        progress: &mut dyn FnMut(usize, usize),
    ) -> Result<UploadReport, EngineError> {
        let file = self.current_file.clone().ok_or(EngineError::NoStepLoaded)?;
        if self.has_unsaved_changes() {
            let message = format!("Save changes to {} before uploading?", file);
            if self.operator.ask_confirmation("Unsaved changes", &message) {
                self.save_step()?;
            }
        }
        self.transition(WorkflowState::Uploading)?;

        let mut report = UploadReport::default();
        for (i, name) in selected.iter().enumerate() {
            self.upload_one(name, &mut report);
            progress(i + 1, selected.len());
        }
        crate::log_info!(
            "Sent {} of {} parameters from {}",
            report.uploaded.len(),
            selected.len(),
            file
        );

        let reset = match report.reset_requirement {
            ResetRequirement::Definite => {
                crate::log_info!("Uploaded parameters require a reset");
                true
            }
            ResetRequirement::Possible => self.operator.ask_confirmation(
                "Reset flight controller",
                &format!("Some parameters of {} may need a reset to take effect. Reset now?", file),
            ),
            ResetRequirement::None => false,
        };
        if reset {
            self.transition(WorkflowState::ResetPending)?;
            let wait = self.reset_wait();
            match self.client.reset_and_reconnect(wait) {
                Ok(()) => report.reset_performed = true,
                Err(e) => {
                    crate::log_error!("Flight controller reset failed: {}", e);
                    self.operator.show_error("Reset failed", &e.to_string());
                }
            }
        }

        self.transition(WorkflowState::Verifying)?;
        self.verify(&mut report, progress);

        if report.is_success() {
            if let Err(e) = self.vehicle.write_last_uploaded(&file) {
                crate::log_warn!("Cannot record last uploaded step: {}", e);
            }
        } else {
            let message = format!(
                "{} parameters failed to upload, {} did not verify",
                report.send_failures.len(),
                report.mismatches.len()
            );
            crate::log_warn!("{}", message);
            self.operator.show_warning("Upload incomplete", &message);
        }

        let next = if self.has_unsaved_changes() {
            WorkflowState::Editing
        } else {
            WorkflowState::StepLoaded
        };
        self.transition(next)?;
        Ok(report)
    }

    fn upload_one(&mut self, name: &str, report: &mut UploadReport) {
        let Some(param) = self.parameters.get(name) else {
            crate::log_error!("Cannot upload {}: not part of the current step", name);
            report
                .send_failures
                .push((name.to_string(), "not part of the current step".to_string()));
            return;
        };
        if param.doc().is_read_only() {
            crate::log_warn!("Not uploading read-only parameter {}", name);
            report
                .send_failures
                .push((name.to_string(), "read-only".to_string()));
            return;
        }
        let value = param.effective_value();
        let requirement = if param.differs_from_fc() {
            self.reset_policy
                .requirement(name, param.doc().reboot_required())
        } else {
            ResetRequirement::None
        };
        match self.client.set(name, value) {
            Ok(()) => {
                report.uploaded.push(name.to_string());
                report.reset_requirement = report.reset_requirement.max(requirement);
            }
            Err(e) => {
                crate::log_error!("Cannot upload {}: {}", name, e);
                report.send_failures.push((name.to_string(), e.to_string()));
            }
        }
    }

    fn reset_wait(&self) -> Duration {
        let file_ms = self
            .parameters
            .get(BOOT_DELAY_PARAMETER)
            .map_or(0.0, ArduPilotParameter::effective_value);
        let fc_ms = self.fc_parameters.value(BOOT_DELAY_PARAMETER).unwrap_or(0.0);
        Duration::from_secs(reset_wait_seconds(file_ms, fc_ms))
    }

    fn verify(&mut self, report: &mut UploadReport, progress: &mut dyn FnMut(usize, usize)) {
        let downloaded = match self.client.download_all(self.prefer_bulk, progress) {
            Ok((values, defaults)) => {
                self.store_fc_parameters(values, defaults);
                true
            }
            Err(e) => {
                crate::log_error!("Cannot re-download parameters for verification: {}", e);
                false
            }
        };
        for name in &report.uploaded {
            let Some(param) = self.parameters.get(name) else {
                continue;
            };
            let expected = param.effective_value();
            let actual = if downloaded {
                self.fc_parameters.value(name)
            } else {
                None
            };
            if !actual.is_some_and(|a| self.tolerance.is_within(expected, a)) {
                crate::log_warn!("{} is {:?} on the flight controller, expected {}", name, actual, expected);
                report.mismatches.push(ParameterMismatch {
                    name: name.clone(),
                    expected,
                    actual,
                });
            }
        }
    }

    /// Send again only what failed in `report`
    pub fn retry_failed(
        &mut self,
        report: &UploadReport,
        progress: &mut dyn FnMut(usize, usize),
    ) -> Result<UploadReport, EngineError> {
        let failed = report.failed_parameters();
        if failed.is_empty() {
            crate::log_info!("Nothing to retry");
            return Ok(UploadReport::default());
        }
        crate::log_info!("Retrying {} parameters", failed.len());
        self.upload(&failed, progress)
    }
}
