//! Loading and saving SCL documents
//!
//! Maps the generic [`Element`] tree to the typed [`Scl`] model and back.
//! Only the modelled subset is kept: unknown elements and attributes are
//! dropped on load. No schema validation is performed.

use crate::documents::{self, Element};
use crate::error::{Error, Result};
use crate::model::{
    AccessPoint, Address, BasicType, BdaDef, ClientServices, Communication, ConfDataSet,
    ConnectedAp, ControlBlock, ControlBlockAddress, ControlBlockKind, DaDef, DaType, DataSet,
    DataTree, DataTypeTemplates, DoType, EnumType, ExtRef, Fc, Fcda, Ied, LDevice, LNodeType,
    LogicalNode, NodeId, NodeKind, Privates, RptEnabled, Scl, Server, ServiceSettings,
    ServiceType, Services, SettingMode, SubNetwork, Subscribers, TargetLn, Val,
};
use log::debug;

/// Load an SCL document from bytes
pub fn load(xml: &[u8]) -> Result<Scl> {
    let root = documents::parse(xml)?;
    if root.name != "SCL" {
        return Err(Error::Xml(format!(
            "Expected SCL root element, found {}",
            root.name
        )));
    }
    let mut scl = Scl::new();
    if let Some(communication) = root.find_child("Communication") {
        scl.communication = read_communication(communication)?;
    }
    for ied in root.find_children("IED") {
        scl.ieds.push(read_ied(ied)?);
    }
    if let Some(templates) = root.find_child("DataTypeTemplates") {
        scl.templates = read_templates(templates)?;
    }
    debug!("loaded SCL document with {} IED(s)", scl.ieds.len());
    Ok(scl)
}

/// Load an SCL document from a string
pub fn load_str(xml: &str) -> Result<Scl> {
    load(xml.as_bytes())
}

/// Serialize the modelled subset of a document as SCL text
pub fn save(scl: &Scl) -> Result<String> {
    let mut root = Element::new("SCL")
        .with_attr("xmlns", crate::SCL_NAMESPACE)
        .with_attr("version", "2007")
        .with_attr("revision", "B");
    if !scl.communication.is_empty() {
        root.add_child(write_communication(&scl.communication));
    }
    for ied in &scl.ieds {
        root.add_child(write_ied(ied));
    }
    root.add_child(write_templates(&scl.templates));
    documents::write(&root)
}

// ============================================================================
// Reading
// ============================================================================

fn required(el: &Element, name: &str) -> Result<String> {
    el.attr(name).map(str::to_string).ok_or_else(|| {
        Error::Xml(format!(
            "Missing attribute {} on element {}",
            name, el.name
        ))
    })
}

fn parse_opt_i64(el: &Element, name: &str) -> Result<Option<i64>> {
    match el.attr(name) {
        None => Ok(None),
        Some(v) => v.trim().parse::<i64>().map(Some).map_err(|_| {
            Error::Xml(format!(
                "Invalid integer {} for attribute {} on element {}",
                v, name, el.name
            ))
        }),
    }
}

fn parse_opt_u32(el: &Element, name: &str) -> Result<Option<u32>> {
    parse_opt_i64(el, name)?
        .map(|v| {
            u32::try_from(v).map_err(|_| {
                Error::Xml(format!(
                    "Invalid integer {} for attribute {} on element {}",
                    v, name, el.name
                ))
            })
        })
        .transpose()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

fn parse_fc(el: &Element) -> Result<Fc> {
    required(el, "fc")?.parse()
}

fn parse_service_type(el: &Element, name: &str) -> Result<Option<ServiceType>> {
    el.attr(name).map(str::parse).transpose()
}

fn read_privates(el: &Element) -> Privates {
    el.find_children("Private")
        .filter_map(|p| {
            p.attr("type").map(|t| {
                (
                    t.to_string(),
                    p.text.clone().unwrap_or_default().into_bytes(),
                )
            })
        })
        .collect()
}

fn read_vals(el: &Element) -> Result<Vec<Val>> {
    el.find_children("Val")
        .map(|v| {
            Ok(Val::new(
                parse_opt_u32(v, "sGroup")?.unwrap_or(0),
                v.text.clone().unwrap_or_default(),
            ))
        })
        .collect()
}

fn read_address(el: &Element) -> Address {
    el.find_child("Address")
        .map(|a| {
            a.find_children("P")
                .filter_map(|p| {
                    p.attr("type")
                        .map(|t| (t.to_string(), p.text.clone().unwrap_or_default()))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn read_duration(el: &Element, name: &str) -> Result<Option<u64>> {
    match el.find_child(name).and_then(|d| d.text.as_deref()) {
        None => Ok(None),
        Some(v) => v.trim().parse::<u64>().map(Some).map_err(|_| {
            Error::Xml(format!("Invalid duration {} for element {}", v, name))
        }),
    }
}

fn read_control_block_address(el: &Element) -> Result<ControlBlockAddress> {
    let mut entry = ControlBlockAddress::new(required(el, "ldInst")?, required(el, "cbName")?);
    entry.address = read_address(el);
    entry.min_time = read_duration(el, "MinTime")?;
    entry.max_time = read_duration(el, "MaxTime")?;
    Ok(entry)
}

fn read_communication(el: &Element) -> Result<Communication> {
    let mut communication = Communication::default();
    for sn in el.find_children("SubNetwork") {
        let mut sub_network = SubNetwork::new(required(sn, "name")?, sn.attr("type"));
        for cap in sn.find_children("ConnectedAP") {
            let mut connected_ap =
                ConnectedAp::new(required(cap, "iedName")?, required(cap, "apName")?);
            connected_ap.address = read_address(cap);
            for gse in cap.find_children("GSE") {
                connected_ap.gse.push(read_control_block_address(gse)?);
            }
            for smv in cap.find_children("SMV") {
                connected_ap.smv.push(read_control_block_address(smv)?);
            }
            sub_network.connected_aps.push(connected_ap);
        }
        communication.sub_networks.push(sub_network);
    }
    Ok(communication)
}

fn read_ied(el: &Element) -> Result<Ied> {
    let mut ied = Ied::new(required(el, "name")?);
    ied.privates = read_privates(el);
    for ap in el.find_children("AccessPoint") {
        ied.access_points.push(read_access_point(ap)?);
    }
    Ok(ied)
}

fn read_settings(el: Option<&Element>) -> Option<ServiceSettings> {
    el.map(|s| ServiceSettings {
        cb_name: s.attr("cbName").and_then(SettingMode::parse),
        dat_set: s.attr("datSet").and_then(SettingMode::parse),
    })
}

fn read_max(el: Option<&Element>) -> Result<Option<i64>> {
    match el {
        Some(e) => parse_opt_i64(e, "max"),
        None => Ok(None),
    }
}

fn read_services(el: &Element) -> Result<Services> {
    let conf_data_set = match el.find_child("ConfDataSet") {
        Some(c) => Some(ConfDataSet {
            max: parse_opt_i64(c, "max")?,
            max_attributes: parse_opt_i64(c, "maxAttributes")?,
        }),
        None => None,
    };
    let client_services = match el.find_child("ClientServices") {
        Some(c) => Some(ClientServices {
            max_attributes: parse_opt_i64(c, "maxAttributes")?,
            max_reports: parse_opt_i64(c, "maxReports")?,
            max_goose: parse_opt_i64(c, "maxGOOSE")?,
            max_smv: parse_opt_i64(c, "maxSMV")?,
        }),
        None => None,
    };
    Ok(Services {
        conf_data_set,
        conf_report_control: read_max(el.find_child("ConfReportControl"))?,
        goose: read_max(el.find_child("GOOSE"))?,
        smv_sc: read_max(el.find_child("SMVsc"))?,
        client_services,
        report_settings: read_settings(el.find_child("ReportSettings")),
        gse_settings: read_settings(el.find_child("GSESettings")),
        smv_settings: read_settings(el.find_child("SMVSettings")),
        conf_sg: el
            .find_child("SettingGroups")
            .map(|sg| sg.find_child("ConfSG").is_some())
            .unwrap_or(false),
    })
}

fn read_access_point(el: &Element) -> Result<AccessPoint> {
    let mut ap = AccessPoint {
        name: required(el, "name")?,
        services: el.find_child("Services").map(read_services).transpose()?,
        server: Server::default(),
    };
    if let Some(server) = el.find_child("Server") {
        for ld in server.find_children("LDevice") {
            ap.server.ldevices.push(read_ldevice(ld)?);
        }
    }
    Ok(ap)
}

fn read_ldevice(el: &Element) -> Result<LDevice> {
    let inst = required(el, "inst")?;
    let ln0 = match el.find_child("LN0") {
        Some(ln0) => read_ln(ln0, true)?,
        None => LogicalNode::ln0(""),
    };
    let mut lns = Vec::new();
    for ln in el.find_children("LN") {
        lns.push(read_ln(ln, false)?);
    }
    Ok(LDevice {
        inst,
        ld_name: el.attr_non_empty("ldName"),
        ln0,
        lns,
        privates: read_privates(el),
    })
}

fn read_ln(el: &Element, zero: bool) -> Result<LogicalNode> {
    let ln_type = el.attr("lnType").unwrap_or("").to_string();
    let mut ln = if zero {
        LogicalNode::ln0(ln_type)
    } else {
        LogicalNode::ln(
            required(el, "lnClass")?,
            el.attr("inst").unwrap_or(""),
            el.attr("prefix"),
            ln_type,
        )
    };
    ln.privates = read_privates(el);
    for doi in el.find_children("DOI") {
        let id = ln.data.add_doi(required(doi, "name")?);
        read_data_children(&mut ln.data, id, doi)?;
    }
    for ds in el.find_children("DataSet") {
        ln.data_sets.push(read_data_set(ds)?);
    }
    if let Some(inputs) = el.find_child("Inputs") {
        for ext_ref in inputs.find_children("ExtRef") {
            ln.inputs.push(read_ext_ref(ext_ref)?);
        }
    }
    for child in &el.children {
        let kind = match child.name.as_str() {
            "GSEControl" => ControlBlockKind::Goose,
            "SampledValueControl" => ControlBlockKind::Smv,
            "ReportControl" => ControlBlockKind::Report,
            _ => continue,
        };
        ln.controls.push(read_control(child, kind)?);
    }
    Ok(ln)
}

fn read_data_children(tree: &mut DataTree, parent: NodeId, el: &Element) -> Result<()> {
    for child in &el.children {
        match child.name.as_str() {
            "SDI" => {
                let id = tree.add_sdi(parent, required(child, "name")?)?;
                read_data_children(tree, id, child)?;
            }
            "DAI" => {
                let structured = child
                    .children
                    .iter()
                    .any(|c| c.name == "SDI" || c.name == "DAI");
                let val_import = child.attr("valImport").and_then(parse_bool);
                let id = tree.add_dai(parent, required(child, "name")?, structured, val_import)?;
                if let Some(dai) = tree.dai_mut(id) {
                    dai.values = read_vals(child)?;
                }
                if structured {
                    read_data_children(tree, id, child)?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn read_data_set(el: &Element) -> Result<DataSet> {
    let mut ds = DataSet::new(required(el, "name")?);
    for f in el.find_children("FCDA") {
        // Document order is kept as-is; ordering applies to API insertions
        ds.fcdas.push(Fcda {
            ld_inst: f.attr_non_empty("ldInst"),
            prefix: f.attr_non_empty("prefix"),
            ln_class: f.attr_non_empty("lnClass"),
            ln_inst: f.attr_non_empty("lnInst"),
            do_name: f.attr_non_empty("doName"),
            da_name: f.attr_non_empty("daName"),
            fc: parse_fc(f)?,
        });
    }
    Ok(ds)
}

fn read_target(el: &Element, ied_name: String) -> TargetLn {
    TargetLn {
        ap_ref: el.attr_non_empty("apRef"),
        ied_name,
        ld_inst: el.attr("ldInst").unwrap_or("").to_string(),
        ln_inst: el.attr_non_empty("lnInst"),
        ln_class: el.attr("lnClass").unwrap_or("").to_string(),
        prefix: el.attr_non_empty("prefix"),
    }
}

fn read_control(el: &Element, kind: ControlBlockKind) -> Result<ControlBlock> {
    let mut cb = ControlBlock::new(kind, required(el, "name")?, el.attr_non_empty("datSet"));
    cb.conf_rev = parse_opt_u32(el, "confRev")?.unwrap_or(0);
    cb.subscribers = match kind {
        ControlBlockKind::Goose | ControlBlockKind::Smv => {
            cb.id = el.attr_non_empty(if kind == ControlBlockKind::Goose {
                "appID"
            } else {
                "smvID"
            });
            let targets = el
                .find_children("IEDName")
                .map(|t| read_target(t, t.text.clone().unwrap_or_default()))
                .collect();
            if kind == ControlBlockKind::Goose {
                Subscribers::Goose(targets)
            } else {
                Subscribers::Smv(targets)
            }
        }
        ControlBlockKind::Report => {
            cb.id = el.attr_non_empty("rptID");
            let rpt = match el.find_child("RptEnabled") {
                Some(r) => Some(RptEnabled {
                    max: parse_opt_u32(r, "max")?.unwrap_or(1),
                    client_lns: r
                        .find_children("ClientLN")
                        .map(|c| read_target(c, c.attr("iedName").unwrap_or("").to_string()))
                        .collect(),
                }),
                None => None,
            };
            Subscribers::Report(rpt)
        }
    };
    Ok(cb)
}

fn read_ext_ref(el: &Element) -> Result<ExtRef> {
    Ok(ExtRef {
        desc: el.attr("desc").map(str::to_string),
        int_addr: el.attr_non_empty("intAddr"),
        p_do: el.attr_non_empty("pDO"),
        p_da: el.attr_non_empty("pDA"),
        p_ln: el.attr_non_empty("pLN"),
        p_serv_t: parse_service_type(el, "pServT")?,
        ied_name: el.attr_non_empty("iedName"),
        ld_inst: el.attr_non_empty("ldInst"),
        prefix: el.attr_non_empty("prefix"),
        ln_class: el.attr_non_empty("lnClass"),
        ln_inst: el.attr_non_empty("lnInst"),
        do_name: el.attr_non_empty("doName"),
        da_name: el.attr_non_empty("daName"),
        service_type: parse_service_type(el, "serviceType")?,
        src_ld_inst: el.attr_non_empty("srcLDInst"),
        src_prefix: el.attr_non_empty("srcPrefix"),
        src_ln_class: el.attr_non_empty("srcLNClass"),
        src_ln_inst: el.attr_non_empty("srcLNInst"),
        src_cb_name: el.attr_non_empty("srcCBName"),
    })
}

fn read_templates(el: &Element) -> Result<DataTypeTemplates> {
    let mut templates = DataTypeTemplates::new();
    for t in el.find_children("LNodeType") {
        let mut lnt = LNodeType::new(required(t, "id")?, t.attr("lnClass").unwrap_or(""));
        for d in t.find_children("DO") {
            lnt = lnt.with_do(required(d, "name")?, required(d, "type")?);
        }
        templates.add_lnode_type(lnt);
    }
    for t in el.find_children("DOType") {
        let mut do_type = DoType::new(required(t, "id")?, t.attr("cdc").unwrap_or(""));
        for child in &t.children {
            match child.name.as_str() {
                "SDO" => {
                    do_type = do_type.with_sdo(required(child, "name")?, required(child, "type")?);
                }
                "DA" => {
                    let b_type = BasicType::parse(child.attr("bType").unwrap_or(""));
                    let mut da = DaDef::new(required(child, "name")?, parse_fc(child)?, b_type);
                    da.type_id = child.attr_non_empty("type");
                    da.val_import = child
                        .attr("valImport")
                        .and_then(parse_bool)
                        .unwrap_or(false);
                    da.values = read_vals(child)?;
                    do_type = do_type.with_da(da);
                }
                _ => {}
            }
        }
        templates.add_do_type(do_type);
    }
    for t in el.find_children("DAType") {
        let mut da_type = DaType::new(required(t, "id")?);
        for b in t.find_children("BDA") {
            let mut bda = BdaDef::new(
                required(b, "name")?,
                BasicType::parse(b.attr("bType").unwrap_or("")),
            );
            bda.type_id = b.attr_non_empty("type");
            bda.values = read_vals(b)?;
            da_type = da_type.with_bda(bda);
        }
        templates.add_da_type(da_type);
    }
    for t in el.find_children("EnumType") {
        let mut values = Vec::new();
        for v in t.find_children("EnumVal") {
            let ord = parse_opt_i64(v, "ord")?.unwrap_or(0) as i32;
            values.push((ord, v.text.clone().unwrap_or_default()));
        }
        templates.add_enum_type(EnumType {
            id: required(t, "id")?,
            values,
        });
    }
    Ok(templates)
}

// ============================================================================
// Writing
// ============================================================================

fn write_privates(el: &mut Element, privates: &Privates) {
    for (key, value) in privates {
        let mut p = Element::new("Private").with_attr("type", key.as_str());
        p.set_text(String::from_utf8_lossy(value).into_owned());
        el.add_child(p);
    }
}

fn write_vals(el: &mut Element, values: &[Val]) {
    for v in values {
        let mut val = Element::new("Val");
        if v.s_group != 0 {
            val.set_attr("sGroup", v.s_group.to_string());
        }
        val.set_text(v.value.clone());
        el.add_child(val);
    }
}

fn write_address(el: &mut Element, address: &Address) {
    if address.is_empty() {
        return;
    }
    let mut a = Element::new("Address");
    for (p_type, value) in address {
        let mut p = Element::new("P").with_attr("type", p_type.as_str());
        p.set_text(value.clone());
        a.add_child(p);
    }
    el.add_child(a);
}

fn write_duration(el: &mut Element, name: &str, value: Option<u64>) {
    if let Some(v) = value {
        let mut d = Element::new(name)
            .with_attr("unit", "s")
            .with_attr("multiplier", "m");
        d.set_text(v.to_string());
        el.add_child(d);
    }
}

fn write_control_block_address(name: &str, entry: &ControlBlockAddress) -> Element {
    let mut el = Element::new(name)
        .with_attr("ldInst", entry.ld_inst.as_str())
        .with_attr("cbName", entry.cb_name.as_str());
    write_address(&mut el, &entry.address);
    write_duration(&mut el, "MinTime", entry.min_time);
    write_duration(&mut el, "MaxTime", entry.max_time);
    el
}

fn write_communication(communication: &Communication) -> Element {
    let mut el = Element::new("Communication");
    for sub_network in &communication.sub_networks {
        let mut sn = Element::new("SubNetwork").with_attr("name", sub_network.name.as_str());
        sn.set_opt_attr("type", sub_network.kind.as_deref());
        for connected_ap in &sub_network.connected_aps {
            let mut cap = Element::new("ConnectedAP")
                .with_attr("iedName", connected_ap.ied_name.as_str())
                .with_attr("apName", connected_ap.ap_name.as_str());
            write_address(&mut cap, &connected_ap.address);
            for gse in &connected_ap.gse {
                cap.add_child(write_control_block_address("GSE", gse));
            }
            for smv in &connected_ap.smv {
                cap.add_child(write_control_block_address("SMV", smv));
            }
            sn.add_child(cap);
        }
        el.add_child(sn);
    }
    el
}

fn write_ied(ied: &Ied) -> Element {
    let mut el = Element::new("IED").with_attr("name", ied.name.as_str());
    write_privates(&mut el, &ied.privates);
    for ap in &ied.access_points {
        el.add_child(write_access_point(ap));
    }
    el
}

fn write_max(services: &mut Element, name: &str, max: Option<i64>) {
    if let Some(m) = max {
        services.add_child(Element::new(name).with_attr("max", m.to_string()));
    }
}

fn write_settings(services: &mut Element, name: &str, settings: Option<&ServiceSettings>) {
    if let Some(s) = settings {
        let mut el = Element::new(name);
        el.set_opt_attr("cbName", s.cb_name.map(|m| m.as_str()));
        el.set_opt_attr("datSet", s.dat_set.map(|m| m.as_str()));
        services.add_child(el);
    }
}

fn write_services(services: &Services) -> Element {
    let mut el = Element::new("Services");
    if let Some(c) = &services.conf_data_set {
        let mut cds = Element::new("ConfDataSet");
        cds.set_opt_attr("max", c.max.map(|v| v.to_string()).as_deref());
        cds.set_opt_attr(
            "maxAttributes",
            c.max_attributes.map(|v| v.to_string()).as_deref(),
        );
        el.add_child(cds);
    }
    write_max(&mut el, "ConfReportControl", services.conf_report_control);
    write_max(&mut el, "GOOSE", services.goose);
    write_max(&mut el, "SMVsc", services.smv_sc);
    if let Some(c) = &services.client_services {
        let mut cs = Element::new("ClientServices");
        for (name, value) in [
            ("maxAttributes", c.max_attributes),
            ("maxReports", c.max_reports),
            ("maxGOOSE", c.max_goose),
            ("maxSMV", c.max_smv),
        ] {
            cs.set_opt_attr(name, value.map(|v| v.to_string()).as_deref());
        }
        el.add_child(cs);
    }
    write_settings(&mut el, "ReportSettings", services.report_settings.as_ref());
    write_settings(&mut el, "GSESettings", services.gse_settings.as_ref());
    write_settings(&mut el, "SMVSettings", services.smv_settings.as_ref());
    if services.conf_sg {
        let mut sg = Element::new("SettingGroups");
        sg.add_child(Element::new("ConfSG"));
        el.add_child(sg);
    }
    el
}

fn write_access_point(ap: &AccessPoint) -> Element {
    let mut el = Element::new("AccessPoint").with_attr("name", ap.name.as_str());
    if let Some(services) = &ap.services {
        el.add_child(write_services(services));
    }
    if !ap.server.ldevices.is_empty() {
        let mut server = Element::new("Server");
        for ld in &ap.server.ldevices {
            server.add_child(write_ldevice(ld));
        }
        el.add_child(server);
    }
    el
}

fn write_ldevice(ld: &LDevice) -> Element {
    let mut el = Element::new("LDevice").with_attr("inst", ld.inst.as_str());
    el.set_opt_attr("ldName", ld.ld_name.as_deref());
    write_privates(&mut el, &ld.privates);
    el.add_child(write_ln(&ld.ln0));
    for ln in &ld.lns {
        el.add_child(write_ln(ln));
    }
    el
}

fn write_data_node(tree: &DataTree, id: NodeId) -> Element {
    let node = tree.node(id);
    let mut el = Element::new(node.kind.tag()).with_attr("name", node.name.as_str());
    if let NodeKind::Dai(dai) = &node.kind {
        if let Some(v) = dai.val_import {
            el.set_attr("valImport", v.to_string());
        }
        write_vals(&mut el, &dai.values);
    }
    for child in tree.children(id) {
        el.add_child(write_data_node(tree, *child));
    }
    el
}

fn write_target(el: &mut Element, target: &TargetLn) {
    el.set_opt_attr("apRef", target.ap_ref.as_deref());
    el.set_attr("ldInst", target.ld_inst.as_str());
    el.set_opt_attr("prefix", target.prefix.as_deref());
    el.set_attr("lnClass", target.ln_class.as_str());
    el.set_opt_attr("lnInst", target.ln_inst.as_deref());
}

fn write_control(cb: &ControlBlock) -> Element {
    let kind = cb.kind();
    let mut el = Element::new(kind.tag()).with_attr("name", cb.name.as_str());
    el.set_opt_attr("datSet", cb.dat_set.as_deref());
    el.set_attr("confRev", cb.conf_rev.to_string());
    let id_attr = match kind {
        ControlBlockKind::Goose => "appID",
        ControlBlockKind::Smv => "smvID",
        ControlBlockKind::Report => "rptID",
    };
    el.set_opt_attr(id_attr, cb.id.as_deref());
    match &cb.subscribers {
        Subscribers::Goose(targets) | Subscribers::Smv(targets) => {
            for t in targets {
                let mut ied_name = Element::new("IEDName");
                write_target(&mut ied_name, t);
                ied_name.set_text(t.ied_name.clone());
                el.add_child(ied_name);
            }
        }
        Subscribers::Report(Some(rpt)) => {
            let mut enabled = Element::new("RptEnabled").with_attr("max", rpt.max.to_string());
            for t in &rpt.client_lns {
                let mut client = Element::new("ClientLN").with_attr("iedName", t.ied_name.as_str());
                write_target(&mut client, t);
                enabled.add_child(client);
            }
            el.add_child(enabled);
        }
        Subscribers::Report(None) => {}
    }
    el
}

fn write_ext_ref(e: &ExtRef) -> Element {
    let mut el = Element::new("ExtRef");
    let attrs: [(&str, Option<&str>); 19] = [
        ("desc", e.desc.as_deref()),
        ("intAddr", e.int_addr.as_deref()),
        ("pDO", e.p_do.as_deref()),
        ("pDA", e.p_da.as_deref()),
        ("pLN", e.p_ln.as_deref()),
        ("pServT", e.p_serv_t.map(|s| s.as_str())),
        ("iedName", e.ied_name.as_deref()),
        ("ldInst", e.ld_inst.as_deref()),
        ("prefix", e.prefix.as_deref()),
        ("lnClass", e.ln_class.as_deref()),
        ("lnInst", e.ln_inst.as_deref()),
        ("doName", e.do_name.as_deref()),
        ("daName", e.da_name.as_deref()),
        ("serviceType", e.service_type.map(|s| s.as_str())),
        ("srcLDInst", e.src_ld_inst.as_deref()),
        ("srcPrefix", e.src_prefix.as_deref()),
        ("srcLNClass", e.src_ln_class.as_deref()),
        ("srcLNInst", e.src_ln_inst.as_deref()),
        ("srcCBName", e.src_cb_name.as_deref()),
    ];
    for (name, value) in attrs {
        el.set_opt_attr(name, value);
    }
    el
}

fn write_ln(ln: &LogicalNode) -> Element {
    let mut el = if ln.is_ln0() {
        Element::new("LN0")
            .with_attr("lnClass", ln.ln_class.as_str())
            .with_attr("inst", "")
    } else {
        let mut el = Element::new("LN");
        el.set_opt_attr("prefix", ln.prefix.as_deref());
        el.with_attr("lnClass", ln.ln_class.as_str())
            .with_attr("inst", ln.ln_inst.as_str())
    };
    el.set_attr("lnType", ln.ln_type.as_str());
    write_privates(&mut el, &ln.privates);
    for ds in &ln.data_sets {
        let mut ds_el = Element::new("DataSet").with_attr("name", ds.name.as_str());
        for f in &ds.fcdas {
            let mut fcda = Element::new("FCDA");
            fcda.set_opt_attr("ldInst", f.ld_inst.as_deref());
            fcda.set_opt_attr("prefix", f.prefix.as_deref());
            fcda.set_opt_attr("lnClass", f.ln_class.as_deref());
            fcda.set_opt_attr("lnInst", f.ln_inst.as_deref());
            fcda.set_opt_attr("doName", f.do_name.as_deref());
            fcda.set_opt_attr("daName", f.da_name.as_deref());
            fcda.set_attr("fc", f.fc.as_str());
            ds_el.add_child(fcda);
        }
        el.add_child(ds_el);
    }
    for cb in ln.controls.iter().filter(|cb| cb.kind() == ControlBlockKind::Report) {
        el.add_child(write_control(cb));
    }
    for doi in ln.data.dois() {
        el.add_child(write_data_node(&ln.data, *doi));
    }
    if !ln.inputs.is_empty() {
        let mut inputs = Element::new("Inputs");
        for e in &ln.inputs {
            inputs.add_child(write_ext_ref(e));
        }
        el.add_child(inputs);
    }
    for cb in ln.controls.iter().filter(|cb| cb.kind() != ControlBlockKind::Report) {
        el.add_child(write_control(cb));
    }
    el
}

fn write_templates(t: &DataTypeTemplates) -> Element {
    let mut el = Element::new("DataTypeTemplates");
    for lnt in t.lnode_types.values() {
        let mut e = Element::new("LNodeType")
            .with_attr("id", lnt.id.as_str())
            .with_attr("lnClass", lnt.ln_class.as_str());
        for d in &lnt.dos {
            e.add_child(
                Element::new("DO")
                    .with_attr("name", d.name.as_str())
                    .with_attr("type", d.type_id.as_str()),
            );
        }
        el.add_child(e);
    }
    for dot in t.do_types.values() {
        let mut e = Element::new("DOType")
            .with_attr("id", dot.id.as_str())
            .with_attr("cdc", dot.cdc.as_str());
        for entry in &dot.entries {
            match entry {
                crate::model::DoTypeEntry::Sdo { name, type_id } => e.add_child(
                    Element::new("SDO")
                        .with_attr("name", name.as_str())
                        .with_attr("type", type_id.as_str()),
                ),
                crate::model::DoTypeEntry::Da(da) => {
                    let mut da_el = Element::new("DA")
                        .with_attr("name", da.name.as_str())
                        .with_attr("fc", da.fc.as_str())
                        .with_attr("bType", da.b_type.as_str());
                    da_el.set_opt_attr("type", da.type_id.as_deref());
                    if da.val_import {
                        da_el.set_attr("valImport", "true");
                    }
                    write_vals(&mut da_el, &da.values);
                    e.add_child(da_el);
                }
            }
        }
        el.add_child(e);
    }
    for dat in t.da_types.values() {
        let mut e = Element::new("DAType").with_attr("id", dat.id.as_str());
        for bda in &dat.bdas {
            let mut b = Element::new("BDA")
                .with_attr("name", bda.name.as_str())
                .with_attr("bType", bda.b_type.as_str());
            b.set_opt_attr("type", bda.type_id.as_deref());
            write_vals(&mut b, &bda.values);
            e.add_child(b);
        }
        el.add_child(e);
    }
    for et in t.enum_types.values() {
        let mut e = Element::new("EnumType").with_attr("id", et.id.as_str());
        for (ord, literal) in &et.values {
            let mut v = Element::new("EnumVal").with_attr("ord", ord.to_string());
            v.set_text(literal.clone());
            e.add_child(v);
        }
        el.add_child(e);
    }
    el
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LnSlot;

    const SCD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<SCL xmlns="http://www.iec.ch/61850/2003/SCL" version="2007" revision="B">
  <Communication>
    <SubNetwork name="RSPACE_PROCESS" type="8-MMS">
      <ConnectedAP iedName="IED1" apName="AP1">
        <Address><P type="IP">10.0.0.1</P></Address>
        <GSE ldInst="LD1" cbName="CB1">
          <Address><P type="APPID">0001</P><P type="MAC-Address">01-0C-CD-01-00-00</P></Address>
          <MinTime unit="s" multiplier="m">10</MinTime>
          <MaxTime unit="s" multiplier="m">2000</MaxTime>
        </GSE>
      </ConnectedAP>
    </SubNetwork>
  </Communication>
  <IED name="IED1">
    <Private type="COMPAS-ICDHeader">hdr</Private>
    <AccessPoint name="AP1">
      <Services>
        <ConfDataSet max="4" maxAttributes="10"/>
        <GOOSE max="-1"/>
        <ClientServices maxGOOSE="2"/>
        <GSESettings cbName="Conf" datSet="Conf"/>
        <SettingGroups><ConfSG/></SettingGroups>
      </Services>
      <Server>
        <LDevice inst="LD1">
          <LN0 lnClass="LLN0" inst="" lnType="LN0T">
            <DOI name="Mod"><DAI name="stVal"><Val>on</Val></DAI></DOI>
            <DataSet name="DS1">
              <FCDA ldInst="LD1" lnClass="LLN0" doName="Mod" daName="stVal" fc="ST"/>
            </DataSet>
            <Inputs>
              <ExtRef desc="d1" pDO="Do1" intAddr="INT1" iedName="IED2" serviceType="GOOSE"/>
            </Inputs>
            <GSEControl name="CB1" datSet="DS1" appID="APP1" confRev="1">
              <IEDName apRef="AP1" ldInst="LD1" lnClass="LLN0">IED2</IEDName>
            </GSEControl>
          </LN0>
          <LN prefix="P" lnClass="ANCR" inst="1" lnType="ANCRT">
            <DOI name="Do1"><SDI name="sdo1"><DAI name="da1" valImport="false"><Val sGroup="1">5</Val></DAI></SDI></DOI>
          </LN>
        </LDevice>
      </Server>
    </AccessPoint>
  </IED>
  <DataTypeTemplates>
    <LNodeType id="ANCRT" lnClass="ANCR"><DO name="Do1" type="DO1"/></LNodeType>
    <DOType id="DO1" cdc="ASG"><DA name="da1" fc="SG" bType="INT32" valImport="true"><Val>1</Val></DA></DOType>
    <EnumType id="E1"><EnumVal ord="1">on</EnumVal></EnumType>
  </DataTypeTemplates>
</SCL>"#;

    #[test]
    fn test_load_model() {
        let scl = load_str(SCD).unwrap();
        let ied = &scl.ieds[0];
        assert_eq!(ied.name, "IED1");
        assert_eq!(ied.privates.get("COMPAS-ICDHeader").unwrap(), b"hdr");
        let services = ied.access_points[0].services.as_ref().unwrap();
        assert_eq!(services.conf_data_set.unwrap().max_attributes, Some(10));
        assert_eq!(services.goose, Some(-1));
        assert!(services.conf_sg);
        assert!(services.gse_settings.as_ref().unwrap().can_create_control_block());

        let ld = scl.find_ld("IED1", "LD1").unwrap();
        let ln0 = &scl.ld(ld).ln0;
        assert_eq!(ln0.inputs[0].service_type, Some(ServiceType::Goose));
        assert_eq!(ln0.controls[0].targets()[0].ied_name, "IED2");

        let ln = scl.find_ln(ld, "ANCR", Some("1"), Some("P")).unwrap();
        assert_eq!(ln.slot, LnSlot::Normal(0));
        let tree = &scl.ln(ln).data;
        let doi = tree.doi("Do1").unwrap();
        let sdi = tree.sdi(doi, "sdo1").unwrap();
        let dai = tree.dai_child(sdi, "da1").unwrap();
        assert_eq!(tree.dai(dai).unwrap().val_import, Some(false));
        assert_eq!(tree.dai(dai).unwrap().values, vec![Val::new(1, "5")]);

        assert!(scl.templates.do_type("DO1").unwrap().da("da1").unwrap().val_import);

        let cap = scl.communication.connected_ap("IED1", "AP1").unwrap();
        assert_eq!(cap.address["IP"], "10.0.0.1");
        let gse = cap.gse("LD1", "CB1").unwrap();
        assert_eq!(gse.address["MAC-Address"], "01-0C-CD-01-00-00");
        assert_eq!((gse.min_time, gse.max_time), (Some(10), Some(2000)));
    }

    #[test]
    fn test_save_then_load() {
        let scl = load_str(SCD).unwrap();
        let xml = save(&scl).unwrap();
        let again = load_str(&xml).unwrap();
        assert_eq!(again, scl);
    }

    #[test]
    fn test_out_of_range_unsigned_attribute() {
        for bad in ["4294967296", "-1"] {
            let xml = SCD.replace(r#"<Val sGroup="1">"#, &format!(r#"<Val sGroup="{bad}">"#));
            match load_str(&xml) {
                Err(Error::Xml(msg)) => assert_eq!(
                    msg,
                    format!("Invalid integer {bad} for attribute sGroup on element Val")
                ),
                other => panic!("expected an XML error, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_wrong_root() {
        assert!(matches!(load_str("<IED name=\"x\"/>"), Err(Error::Xml(_))));
    }
}
