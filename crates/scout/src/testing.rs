//! Fixtures shared by the engine's unit tests

use std::io::Write;
use std::path::PathBuf;

/// One IED with a breaker, a switch controller and a GGIO declared twice
pub(crate) const STATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<SCL xmlns="http://www.iec.ch/61850/2003/SCL">
  <IED name="IED1" desc="Bay controller">
    <AccessPoint name="S1">
      <Server>
        <LDevice inst="LD1">
          <LN0 lnClass="LLN0" inst="" lnType="LLN0_T"/>
          <LN lnClass="XCBR" inst="1" lnType="XCBR_T"/>
          <LN lnClass="CSWI" inst="1" lnType="XCBR_T"/>
          <LN lnClass="GGIO" inst="1" lnType="GGIO_T"/>
          <LN lnClass="GGIO" inst="1" lnType="GGIO_T"/>
        </LDevice>
      </Server>
    </AccessPoint>
  </IED>
  <DataTypeTemplates>
    <LNodeType id="LLN0_T" lnClass="LLN0">
      <DO name="Beh" type="ENS_Beh"/>
    </LNodeType>
    <LNodeType id="XCBR_T" lnClass="XCBR">
      <DO name="Beh" type="ENS_Beh"/>
      <DO name="Pos" type="DPC_T"/>
    </LNodeType>
    <LNodeType id="GGIO_T" lnClass="GGIO">
      <DO name="Ind1" type="SPS_T"/>
    </LNodeType>
    <DOType id="ENS_Beh" cdc="ENS">
      <DA name="stVal" fc="ST" bType="Enum" type="Beh_E"/>
    </DOType>
    <DOType id="SPS_T" cdc="SPS">
      <DA name="stVal" fc="ST" bType="BOOLEAN"/>
    </DOType>
    <DOType id="DPC_T" cdc="DPC">
      <DA name="stVal" fc="ST" bType="Dbpos"/>
      <DA name="Oper" fc="CO" bType="Struct" type="Oper_T"/>
      <DA name="ctlModel" fc="CF" bType="Enum" type="CtlModel_E"/>
    </DOType>
    <DAType id="Oper_T">
      <BDA name="ctlVal" bType="BOOLEAN"/>
    </DAType>
    <EnumType id="Beh_E">
      <EnumVal ord="1">ON</EnumVal>
    </EnumType>
    <EnumType id="CtlModel_E">
      <EnumVal ord="0">status-only</EnumVal>
      <EnumVal ord="1">direct-with-normal-security</EnumVal>
      <EnumVal ord="2">sbo-with-normal-security</EnumVal>
    </EnumType>
  </DataTypeTemplates>
</SCL>"#;

/// Write `content` to `name` inside `dir`
pub(crate) fn write_scl(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    path
}
