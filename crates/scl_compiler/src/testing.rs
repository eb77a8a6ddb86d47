//! Shared SCL fixture for unit tests

use std::io::Write;
use std::path::PathBuf;

/// Two IEDs: IED1 publishes GOOSE GCB1 from LD1, IED2 subscribes to it
pub(crate) const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<SCL xmlns="http://www.iec.ch/61850/2003/SCL">
  <Communication>
    <SubNetwork name="W1">
      <ConnectedAP iedName="IED1" apName="S1">
        <Address>
          <P type="IP">192.168.1.10</P>
          <P type="IP-SUBNET">255.255.255.0</P>
        </Address>
        <GSE ldInst="LD1" cbName="GCB1">
          <Address>
            <P type="MAC-Address">01-0C-CD-01-00-01</P>
            <P type="APPID">1001</P>
            <P type="VLAN-ID">005</P>
          </Address>
          <MinTime>4</MinTime>
          <MaxTime>1000</MaxTime>
        </GSE>
      </ConnectedAP>
      <ConnectedAP iedName="IED2" apName="S1">
        <Address>
          <P type="IP">192.168.1.20</P>
          <P type="IP-SUBNET">255.255.255.0</P>
        </Address>
      </ConnectedAP>
    </SubNetwork>
  </Communication>
  <IED name="EMPTY"/>
  <IED name="IED1">
    <AccessPoint name="S1">
      <Server>
        <LDevice inst="LD1">
          <LN0 lnClass="LLN0" inst="" lnType="LLN0_T">
            <DataSet name="DS1">
              <FCDA ldInst="LD1" lnClass="XCBR" lnInst="1" doName="Pos" daName="stVal" fc="ST"/>
            </DataSet>
            <ReportControl name="RCB1" rptID="R1" datSet="DS1" buffered="true" intgPd="5000"/>
            <GSEControl name="GCB1" appID="APP1" datSet="DS1" confRev="3"/>
          </LN0>
          <LN lnClass="XCBR" inst="1" lnType="XCBR_T">
            <ReportControl name="RCB2" datSet="DS1"/>
          </LN>
        </LDevice>
      </Server>
    </AccessPoint>
  </IED>
  <IED name="IED2">
    <AccessPoint name="S1">
      <Server>
        <LDevice inst="PROT">
          <LN0 lnClass="LLN0" inst="" lnType="LLN0_T"/>
          <LN prefix="IN" lnClass="GGIO" inst="1">
            <Inputs>
              <ExtRef iedName="IED1" ldInst="LD1" lnClass="XCBR" lnInst="1" doName="Pos" daName="stVal"
                      serviceType="GOOSE" srcLDInst="LD1" srcCBName="GCB1" intAddr="CB_POS"/>
              <ExtRef iedName="IED1" ldInst="LD1" lnClass="XCBR" lnInst="1" doName="Pos"
                      serviceType="Report" srcLDInst="LD1" srcCBName="RCB1"/>
            </Inputs>
          </LN>
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
      <DO name="Loop" type="LOOP_T"/>
    </LNodeType>
    <DOType id="ENS_Beh" cdc="ENS">
      <DA name="stVal" fc="ST" bType="Enum" type="Beh_E"/>
      <DA name="q" fc="ST" bType="Quality"/>
    </DOType>
    <DOType id="DPC_T" cdc="DPC">
      <DA name="stVal" fc="ST" bType="Dbpos"/>
      <DA name="Oper" fc="CO" bType="Struct" type="Oper_T"/>
      <DA name="ctlModel" fc="CF" bType="Enum" type="CtlModel_E"/>
      <DA name="pulse" fc="CF" bType="Struct" type="Missing_T"/>
    </DOType>
    <DOType id="LOOP_T" cdc="X">
      <SDO name="again" type="LOOP_T"/>
    </DOType>
    <DAType id="Oper_T">
      <BDA name="ctlVal" bType="BOOLEAN"/>
      <BDA name="origin" bType="Struct" type="Origin_T"/>
    </DAType>
    <DAType id="Origin_T">
      <BDA name="orCat" bType="Enum" type="OrCat_E"/>
    </DAType>
    <EnumType id="Beh_E">
      <EnumVal ord="1">ON</EnumVal>
    </EnumType>
    <EnumType id="CtlModel_E">
      <EnumVal ord="0">status-only</EnumVal>
      <EnumVal ord="1">direct-with-normal-security</EnumVal>
    </EnumType>
    <EnumType id="OrCat_E">
      <EnumVal ord="2">station-control</EnumVal>
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
