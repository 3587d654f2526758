//! ExtRef binding resolution
//!
//! An ExtRef is identified inside its holder logical node by its signal
//! (desc, pDO, pDA, intAddr, pServT). Binding it means recording which
//! IED/LDevice/LN/DO/DA feeds it; sourcing it additionally records the
//! control block publishing that data.

use log::{debug, error, warn};

use crate::catalog::{attributes_of_do, check_do_da};
use crate::control_blocks::{control_blocks_for, located_control_blocks_for, LocatedControlBlock};
use crate::error::{Error, Result};
use crate::model::{ExtRef, Fc, LnId, LogicalNode, PrivateStore, Scl, ServiceType, LLN0};
use crate::names::{
    equals_or_both_blank, is_blank, is_valid_da_ref, is_valid_do_ref, non_blank, DaTypeName,
    DoTypeName,
};
use crate::report::ReportItem;

/// Signal identifying an ExtRef inside its holder logical node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalInfo {
    /// Description
    pub desc: Option<String>,
    /// Expected source LN class
    pub p_ln: Option<String>,
    /// Expected source DO
    pub p_do: Option<String>,
    /// Expected source DA
    pub p_da: Option<String>,
    /// Internal address
    pub int_addr: Option<String>,
    /// Expected service type
    pub p_serv_t: Option<ServiceType>,
}

impl SignalInfo {
    /// Signal part of an existing ExtRef
    pub fn from_ext_ref(ext_ref: &ExtRef) -> Self {
        Self {
            desc: ext_ref.desc.clone(),
            p_ln: ext_ref.p_ln.clone(),
            p_do: ext_ref.p_do.clone(),
            p_da: ext_ref.p_da.clone(),
            int_addr: ext_ref.int_addr.clone(),
            p_serv_t: ext_ref.p_serv_t,
        }
    }

    /// pDO and intAddr are set and pDO/pDA are well formed
    pub fn is_valid(&self) -> bool {
        let Some(p_do) = self.p_do.as_deref().filter(|s| !s.trim().is_empty()) else {
            return false;
        };
        if is_blank(self.int_addr.as_deref()) || !is_valid_do_ref(p_do) {
            return false;
        }
        match self.p_da.as_deref() {
            Some(p_da) if !p_da.trim().is_empty() => is_valid_da_ref(p_da),
            _ => true,
        }
    }

    /// Whether the ExtRef carries this signal; blank and absent values match
    pub fn matches(&self, ext_ref: &ExtRef) -> bool {
        equals_or_both_blank(self.desc.as_deref(), ext_ref.desc.as_deref())
            && equals_or_both_blank(self.p_do.as_deref(), ext_ref.p_do.as_deref())
            && equals_or_both_blank(self.p_da.as_deref(), ext_ref.p_da.as_deref())
            && equals_or_both_blank(self.int_addr.as_deref(), ext_ref.int_addr.as_deref())
            && self.p_serv_t == ext_ref.p_serv_t
    }
}

/// Data an ExtRef is bound to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingInfo {
    /// Source IED
    pub ied_name: String,
    /// Source logical device
    pub ld_inst: String,
    /// Source LN prefix
    pub prefix: Option<String>,
    /// Source LN class
    pub ln_class: String,
    /// Source LN instance
    pub ln_inst: Option<String>,
    /// LNodeType of the source LN, when known
    pub ln_type: Option<String>,
    /// Source DO path
    pub do_name: Option<DoTypeName>,
    /// Source DA path
    pub da_name: Option<DaTypeName>,
    /// Functional constraint of the source DA, when known
    pub fc: Option<Fc>,
    /// Transport
    pub service_type: Option<ServiceType>,
}

impl BindingInfo {
    /// Binding part of an existing ExtRef
    pub fn from_ext_ref(ext_ref: &ExtRef) -> Self {
        Self {
            ied_name: ext_ref.ied_name.clone().unwrap_or_default(),
            ld_inst: ext_ref.ld_inst.clone().unwrap_or_default(),
            prefix: ext_ref.prefix.clone(),
            ln_class: ext_ref.ln_class.clone().unwrap_or_default(),
            ln_inst: ext_ref.ln_inst.clone(),
            ln_type: None,
            do_name: ext_ref.do_name.as_deref().map(DoTypeName::new),
            da_name: ext_ref.da_name.as_deref().map(DaTypeName::new),
            fc: None,
            service_type: ext_ref.service_type,
        }
    }

    /// IED, device and LN class are set, the LN instance too unless LLN0,
    /// and the DO path is well formed
    pub fn is_valid(&self) -> bool {
        if let Some(do_name) = &self.do_name {
            let do_ref = do_name.to_string();
            if !do_ref.trim().is_empty() && !is_valid_do_ref(&do_ref) {
                return false;
            }
        }
        !self.ied_name.trim().is_empty()
            && !self.ld_inst.trim().is_empty()
            && !self.ln_class.trim().is_empty()
            && (self.ln_class == LLN0 || !is_blank(self.ln_inst.as_deref()))
    }

    /// Whether the ExtRef already records this binding
    pub fn is_wrapped_in(&self, ext_ref: &ExtRef) -> bool {
        ext_ref.ied_name.as_deref() == Some(self.ied_name.as_str())
            && ext_ref.ld_inst.as_deref() == Some(self.ld_inst.as_str())
            && equals_or_both_blank(self.prefix.as_deref(), ext_ref.prefix.as_deref())
            && equals_or_both_blank(self.ln_inst.as_deref(), ext_ref.ln_inst.as_deref())
            && ext_ref.ln_class.as_deref() == Some(self.ln_class.as_str())
            && (ext_ref.service_type.is_none() || ext_ref.service_type == self.service_type)
    }
}

/// Control block feeding an ExtRef
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceInfo {
    /// Logical device holding the control block
    pub src_ld_inst: Option<String>,
    /// Prefix of the LN holding the control block
    pub src_prefix: Option<String>,
    /// Class of the LN holding the control block
    pub src_ln_class: Option<String>,
    /// Instance of the LN holding the control block
    pub src_ln_inst: Option<String>,
    /// Control block name
    pub src_cb_name: Option<String>,
}

impl SourceInfo {
    /// No field is set
    pub fn is_null(&self) -> bool {
        self.src_ld_inst.is_none()
            && self.src_prefix.is_none()
            && self.src_ln_class.is_none()
            && self.src_ln_inst.is_none()
            && self.src_cb_name.is_none()
    }
}

/// ExtRef request: holder logical node, signal, binding and source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtRefInfo {
    /// IED holding the ExtRef
    pub holder_ied_name: String,
    /// Logical device holding the ExtRef
    pub holder_ld_inst: String,
    /// Class of the LN holding the ExtRef
    pub holder_ln_class: String,
    /// Instance of the LN holding the ExtRef
    pub holder_ln_inst: Option<String>,
    /// Prefix of the LN holding the ExtRef
    pub holder_prefix: Option<String>,
    /// Signal
    pub signal: Option<SignalInfo>,
    /// Binding
    pub binding: Option<BindingInfo>,
    /// Source
    pub source: Option<SourceInfo>,
}

impl ExtRefInfo {
    /// Request on the ExtRefs of `holder_ied_name`/`holder_ld_inst`/`holder_ln_class`
    pub fn new(
        holder_ied_name: impl Into<String>,
        holder_ld_inst: impl Into<String>,
        holder_ln_class: impl Into<String>,
        holder_ln_inst: Option<&str>,
        holder_prefix: Option<&str>,
    ) -> Self {
        Self {
            holder_ied_name: holder_ied_name.into(),
            holder_ld_inst: holder_ld_inst.into(),
            holder_ln_class: holder_ln_class.into(),
            holder_ln_inst: non_blank(holder_ln_inst),
            holder_prefix: non_blank(holder_prefix),
            ..Default::default()
        }
    }

    /// Set the signal and return self
    pub fn with_signal(mut self, signal: SignalInfo) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Set the binding and return self
    pub fn with_binding(mut self, binding: BindingInfo) -> Self {
        self.binding = Some(binding);
        self
    }

    /// Set the source and return self
    pub fn with_source(mut self, source: SourceInfo) -> Self {
        self.source = Some(source);
        self
    }

    fn holder_ln(&self, scl: &Scl) -> Result<LnId> {
        let ld = scl.find_ld(&self.holder_ied_name, &self.holder_ld_inst)?;
        scl.find_ln(
            ld,
            &self.holder_ln_class,
            self.holder_ln_inst.as_deref(),
            self.holder_prefix.as_deref(),
        )
    }
}

fn matching_ext_refs(ln: &LogicalNode, signal: &SignalInfo) -> Vec<usize> {
    ln.inputs
        .iter()
        .enumerate()
        .filter(|(_, e)| signal.matches(e))
        .map(|(i, _)| i)
        .collect()
}

/// Write binding then source fields. Source fields are always cleared
/// first, and only filled when a valid binding was applied.
fn apply_binding(ext_ref: &mut ExtRef, info: &ExtRefInfo) {
    let mut source_reset = false;
    if let Some(binding) = info.binding.as_ref().filter(|b| b.is_valid()) {
        ext_ref.ied_name = Some(binding.ied_name.clone());
        ext_ref.ld_inst = Some(binding.ld_inst.clone());
        ext_ref.ln_inst = binding.ln_inst.clone();
        ext_ref.ln_class = Some(binding.ln_class.clone());
        ext_ref.service_type = binding
            .service_type
            .or_else(|| info.signal.as_ref().and_then(|s| s.p_serv_t));
        ext_ref.da_name = binding
            .da_name
            .as_ref()
            .filter(|d| d.is_defined())
            .map(ToString::to_string);
        ext_ref.do_name = binding
            .do_name
            .as_ref()
            .filter(|d| d.is_defined())
            .map(ToString::to_string);
        ext_ref.prefix = binding.prefix.clone();
        ext_ref.clear_source();
        source_reset = true;
    }
    if let (Some(source), true) = (&info.source, source_reset) {
        ext_ref.src_ln_inst = source.src_ln_inst.clone();
        ext_ref.src_ln_class = source.src_ln_class.clone();
        ext_ref.src_ld_inst = source.src_ld_inst.clone();
        ext_ref.src_prefix = source.src_prefix.clone();
        ext_ref.src_cb_name = source.src_cb_name.clone();
    }
}

/// Rebind the ExtRef of the holder LN carrying the request signal.
///
/// When several ExtRefs carry the signal, the first one is updated.
pub fn update_ext_ref_binders(scl: &mut Scl, info: &ExtRefInfo) -> Result<()> {
    let Some(signal) = info.signal.as_ref().filter(|_| info.binding.is_some()) else {
        return Err(Error::scd(
            "ExtRef Signal and/or Binding information are missing",
        ));
    };
    let holder = info.holder_ln(scl)?;
    if !info.binding.as_ref().map(BindingInfo::is_valid).unwrap_or(false) {
        return Err(Error::scd("ExtRef mandatory binding data are missing"));
    }

    let matches = matching_ext_refs(scl.ln(holder), signal);
    let Some(&first) = matches.first() else {
        return Err(Error::scd(format!(
            "Unknown ExtRef [pDO({}),intAddr({})] in {}/{}.{}",
            signal.p_do.as_deref().unwrap_or(""),
            signal.int_addr.as_deref().unwrap_or(""),
            info.holder_ied_name,
            info.holder_ld_inst,
            scl.ln(holder).ln_class
        )));
    };
    if matches.len() > 1 {
        warn!(
            "More than one ExtRef [pDO({}),intAddr({})] in {}{}/{}, the first one is updated",
            signal.p_do.as_deref().unwrap_or(""),
            signal.int_addr.as_deref().unwrap_or(""),
            info.holder_ied_name,
            info.holder_ld_inst,
            scl.ln(holder).ln_class
        );
    }
    apply_binding(&mut scl.ln_mut(holder).inputs[first], info);
    debug!(
        "ExtRef [pDO({})] of {} rebound",
        signal.p_do.as_deref().unwrap_or(""),
        scl.ln_xpath(holder)
    );
    Ok(())
}

/// Logical node designated by a binding
pub fn binder_ln(scl: &Scl, binding: &BindingInfo) -> Result<LnId> {
    let ied = scl.ied_index(&binding.ied_name)?;
    let ld = scl.find_ld_in(ied, &binding.ld_inst)?;
    scl.find_ln(
        ld,
        &binding.ln_class,
        binding.ln_inst.as_deref(),
        binding.prefix.as_deref(),
    )
}

/// Names of the datasets of `ln` holding an FCDA bound to this signal
pub fn data_sets_matching<'a>(
    ln: &'a LogicalNode,
    signal: &SignalInfo,
    binding: &BindingInfo,
) -> Vec<&'a str> {
    let trimmed = |s: Option<&str>| s.unwrap_or("").trim().to_string();
    ln.data_sets
        .iter()
        .filter(|ds| {
            ds.fcdas.iter().any(|f| {
                trimmed(f.ld_inst.as_deref()) == binding.ld_inst.trim()
                    && trimmed(f.prefix.as_deref()) == trimmed(binding.prefix.as_deref())
                    && trimmed(f.ln_class.as_deref()) == binding.ln_class.trim()
                    && trimmed(f.ln_inst.as_deref()) == trimmed(binding.ln_inst.as_deref())
                    && equals_or_both_blank(f.do_name.as_deref(), signal.p_do.as_deref())
                    && equals_or_both_blank(f.da_name.as_deref(), signal.p_da.as_deref())
            })
        })
        .map(|ds| ds.name.as_str())
        .collect()
}

/// Check a request against the document and return the position of the
/// matched ExtRef in the holder LN inputs.
///
/// The binding, when given, must agree with the one already recorded and
/// designate an existing LN. The source, when given, must name a control
/// block that LN exposes for datasets carrying the signal.
pub fn check_coherence(scl: &Scl, holder: LnId, info: &ExtRefInfo) -> Result<usize> {
    let Some(signal) = &info.signal else {
        error!("Coherence checking needs at least a signal info");
        return Err(Error::scd("Coherence checking needs at least a signal info"));
    };
    let ln = scl.ln(holder);
    let matches = matching_ext_refs(ln, signal);
    let Some(&idx) = matches.first() else {
        let msg = format!(
            "Unknown TExtRef with signal info [pDO({}),intAddr({})] in {}{}/{}{}{}",
            signal.p_do.as_deref().unwrap_or(""),
            signal.int_addr.as_deref().unwrap_or(""),
            scl.ied_of(holder.ld).name,
            scl.ld(holder.ld).inst,
            ln.prefix.as_deref().unwrap_or(""),
            ln.ln_class,
            ln.ln_inst
        );
        error!("{}", msg);
        return Err(Error::scd(msg));
    };
    if matches.len() > 1 {
        warn!(
            "More than one ExtRef with signal info [pDO({}),intAddr({})] in {}, the first one is checked",
            signal.p_do.as_deref().unwrap_or(""),
            signal.int_addr.as_deref().unwrap_or(""),
            scl.ln_xpath(holder)
        );
    }
    let Some(binding) = &info.binding else {
        return Ok(idx);
    };
    if !binding.is_wrapped_in(&ln.inputs[idx]) {
        error!("No relation between binding info and the matched TExtRef");
        return Err(Error::scd(
            "No relation between binding info and the matched TExtRef",
        ));
    }

    let binder = binder_ln(scl, binding)?;
    let source = match &info.source {
        Some(source) if !source.is_null() => source,
        _ => return Ok(idx),
    };
    let binder_node = scl.ln(binder);
    let data_sets = data_sets_matching(binder_node, signal, binding);
    let coherent = control_blocks_for(binder_node, &data_sets, binding.service_type)
        .iter()
        .any(|cb| Some(cb.name.as_str()) == source.src_cb_name.as_deref());
    if !coherent {
        let msg = format!(
            "Unknown control block {} in {}{}/{}{}{}",
            source.src_cb_name.as_deref().unwrap_or(""),
            binding.ied_name,
            binding.ld_inst,
            binding.prefix.as_deref().unwrap_or(""),
            binding.ln_class,
            binding.ln_inst.as_deref().unwrap_or("")
        );
        error!("{}", msg);
        return Err(Error::scd(msg));
    }
    Ok(idx)
}

/// Record binding and source of an ExtRef after checking their coherence.
/// Returns the updated ExtRef.
pub fn update_ext_ref_source(scl: &mut Scl, info: &ExtRefInfo) -> Result<ExtRef> {
    let complete = info.signal.is_some()
        && info.binding.is_some()
        && info
            .source
            .as_ref()
            .map(|s| !is_blank(s.src_cb_name.as_deref()))
            .unwrap_or(false);
    if !complete {
        return Err(Error::scd(
            "ExtRef information (signal, binding, source) are missing",
        ));
    }
    let holder = info.holder_ln(scl)?;
    let idx = check_coherence(scl, holder, info)?;
    let ext_ref = &mut scl.ln_mut(holder).inputs[idx];
    apply_binding(ext_ref, info);
    Ok(ext_ref.clone())
}

/// Control blocks of the bound LN able to feed the request ExtRef
pub fn ext_ref_source_info<'a>(
    scl: &'a Scl,
    info: &ExtRefInfo,
) -> Result<Vec<LocatedControlBlock<'a>>> {
    let Some(signal) = info.signal.as_ref().filter(|s| s.is_valid()) else {
        return Err(Error::scd(
            "Invalid or missing attributes in ExtRef signal info",
        ));
    };
    let Some(binding) = info.binding.as_ref().filter(|b| b.is_valid()) else {
        return Err(Error::scd(
            "Invalid or missing attributes in ExtRef binding info",
        ));
    };
    if binding.ied_name == info.holder_ied_name {
        return Err(Error::scd("Internal binding can't have control block"));
    }
    let holder = info.holder_ln(scl)?;
    check_coherence(scl, holder, info)?;

    let binder = binder_ln(scl, binding)?;
    let data_sets = data_sets_matching(scl.ln(binder), signal, binding);
    Ok(located_control_blocks_for(
        scl,
        binder,
        &data_sets,
        binding.service_type,
    ))
}

fn binder_of(
    scl: &Scl,
    ln_id: LnId,
    signal: &SignalInfo,
) -> Result<BindingInfo> {
    let ln = scl.ln(ln_id);
    let templates = &scl.templates;
    if templates.lnode_type(&ln.ln_type).is_none() {
        return Err(Error::scd(format!("Unknown LNodeType : {}", ln.ln_type)));
    }
    let mut binding = BindingInfo {
        ied_name: scl.ied_of(ln_id.ld).name.clone(),
        ld_inst: scl.ld(ln_id.ld).inst.clone(),
        prefix: ln.prefix.clone(),
        ln_class: ln.ln_class.clone(),
        ln_inst: non_blank(Some(&ln.ln_inst)),
        ln_type: Some(ln.ln_type.clone()),
        ..Default::default()
    };
    let Some(p_do) = signal.p_do.as_deref() else {
        return Ok(binding);
    };
    let do_name = DoTypeName::new(p_do);
    match signal.p_da.as_deref().filter(|s| !s.trim().is_empty()) {
        None => {
            if attributes_of_do(templates, &ln.ln_type, &do_name)?.is_empty() {
                return Err(Error::scd(format!(
                    "Unknown DO({}) in LNodeType({})",
                    do_name, ln.ln_type
                )));
            }
        }
        Some(p_da) => {
            let da_name = DaTypeName::new(p_da);
            let attr = check_do_da(templates, &ln.ln_type, &do_name, &da_name)?;
            if attr.b_type.is_struct() {
                return Err(Error::scd(format!(
                    "Invalid ExtRef signal: no coherence between pDO({}) and pDA({})",
                    p_do, p_da
                )));
            }
            binding.fc = Some(attr.fc);
            binding.da_name = Some(da_name);
        }
    }
    binding.do_name = Some(do_name);
    Ok(binding)
}

/// Logical nodes of the whole document able to feed the request signal.
///
/// The signal must exist in the holder LN. Candidates are restricted to
/// the pLN class when it is set; a candidate qualifies when its LNodeType
/// exposes the pDO path (and the pDA path when set).
pub fn binders_for(scl: &Scl, info: &ExtRefInfo) -> Result<Vec<BindingInfo>> {
    let holder = info.holder_ln(scl)?;
    let ln = scl.ln(holder);
    let Some(signal) = info.signal.as_ref().filter(|_| !ln.inputs.is_empty()) else {
        return Err(Error::scd("No Inputs for LN or no ExtRef signal to check"));
    };
    if !signal.is_valid() {
        return Err(Error::scd(
            "Invalid or missing attributes in ExtRef signal info",
        ));
    }
    if matching_ext_refs(ln, signal).is_empty() {
        return Err(Error::scd("ExtRef signal does not exist in target LN"));
    }

    let mut binders = Vec::new();
    for ld in scl.ld_ids() {
        for candidate in scl.ln_ids(ld) {
            let class = &scl.ln(candidate).ln_class;
            if !is_blank(signal.p_ln.as_deref()) && signal.p_ln.as_deref() != Some(class.as_str()) {
                continue;
            }
            match binder_of(scl, candidate, signal) {
                Ok(binding) => binders.push(binding),
                Err(e) => debug!("{} cannot bind the signal: {}", scl.ln_xpath(candidate), e),
            }
        }
    }
    Ok(binders)
}

/// Clear the source fields of every ExtRef of the document
pub fn remove_all_ext_ref_source_bindings(scl: &mut Scl) {
    for ld in scl.ld_ids() {
        for ln in scl.ln_ids(ld) {
            for ext_ref in scl.ln_mut(ln).inputs.iter_mut() {
                ext_ref.clear_source();
            }
        }
    }
}

/// One warning per IED lacking the private payload `key`
pub fn check_ied_privates(scl: &Scl, key: &str) -> Vec<ReportItem> {
    scl.ieds
        .iter()
        .filter(|ied| !ied.has_private(key))
        .map(|ied| ReportItem::warning(ied.xpath(), format!("IED has no Private {} element", key)))
        .collect()
}
