//! Shared submission documents for tests.

/// The smallest submission the structural checks accept: a root
/// device with one (unreliable) child, one processor, release data
/// and an empty question list.
pub const MINIMAL_HAL_SUBMISSION: &str = r#"<system version="1.0">
  <summary>
    <live_cd value="False"/>
    <system_id value="f982bb1ab536edc3fbf1d28e73ad4949"/>
    <distribution value="Ubuntu"/>
    <distroseries value="9.04"/>
    <architecture value="amd64"/>
    <private value="False"/>
    <contactable value="False"/>
    <date_created value="2009-04-14T08:47:42.125342"/>
    <client name="hwtest" version="0.9">
      <plugin name="architecture_info" version="1.1"/>
    </client>
  </summary>
  <hardware>
    <hal version="0.5.11">
      <device id="1" udi="/org/freedesktop/Hal/devices/computer">
        <property name="system.hardware.vendor" type="str">FooCorp</property>
        <property name="system.hardware.product" type="str">Baz 9000</property>
      </device>
      <device id="2" udi="/org/freedesktop/Hal/devices/platform_i8042">
        <property name="info.parent" type="str">/org/freedesktop/Hal/devices/computer</property>
        <property name="info.bus" type="str">platform</property>
      </device>
    </hal>
    <processors>
      <processor id="100" name="0">
        <property name="cpu_mhz" type="float">1000.0</property>
      </processor>
    </processors>
  </hardware>
  <software>
    <lsbrelease>
      <property name="distributor-id" type="str">Ubuntu</property>
      <property name="release" type="str">9.04</property>
    </lsbrelease>
  </software>
  <questions>
  </questions>
</system>
"#;

/// A submission with the layering of a SATA disk behind an AHCI
/// controller, a consistent kernel package list and a question
/// targeting the controller.
pub const FULL_HAL_SUBMISSION: &str = r#"<system version="1.0">
  <summary>
    <live_cd value="False"/>
    <system_id value="f982bb1ab536edc3fbf1d28e73ad4949"/>
    <distribution value="Ubuntu"/>
    <distroseries value="9.04"/>
    <architecture value="amd64"/>
    <private value="False"/>
    <contactable value="False"/>
    <date_created value="2009-04-14T08:47:42.125342"/>
    <client name="hwtest" version="0.9"/>
  </summary>
  <hardware>
    <hal version="0.5.11">
      <device id="1" udi="/org/freedesktop/Hal/devices/computer">
        <property name="system.hardware.vendor" type="str">FooCorp</property>
        <property name="system.hardware.product" type="str">Baz 9000</property>
        <property name="system.kernel.version" type="str">2.6.28-11-generic</property>
      </device>
      <device id="2" udi="/org/freedesktop/Hal/devices/pci_8086_27c5">
        <property name="info.parent" type="str">/org/freedesktop/Hal/devices/computer</property>
        <property name="info.bus" type="str">pci</property>
        <property name="pci.device_class" type="int">1</property>
        <property name="pci.device_subclass" type="int">6</property>
        <property name="pci.vendor_id" type="int">32902</property>
        <property name="pci.product_id" type="int">10181</property>
        <property name="info.product" type="str">82801GBM AHCI Controller</property>
        <property name="info.linux.driver" type="str">ahci</property>
      </device>
      <device id="3" udi="/org/freedesktop/Hal/devices/pci_8086_27c5_scsi_host">
        <property name="info.parent" type="str">/org/freedesktop/Hal/devices/pci_8086_27c5</property>
      </device>
      <device id="4" udi="/org/freedesktop/Hal/devices/pci_8086_27c5_scsi_host_scsi_device_lun0">
        <property name="info.parent" type="str">/org/freedesktop/Hal/devices/pci_8086_27c5_scsi_host</property>
        <property name="info.bus" type="str">scsi</property>
        <property name="scsi.vendor" type="str">ATA</property>
        <property name="scsi.model" type="str">Hitachi HTS54161</property>
        <property name="info.linux.driver" type="str">sd</property>
      </device>
    </hal>
    <processors>
      <processor id="100" name="0">
        <property name="cpu_mhz" type="float">1800.0</property>
      </processor>
    </processors>
  </hardware>
  <software>
    <lsbrelease>
      <property name="distributor-id" type="str">Ubuntu</property>
      <property name="release" type="str">9.04</property>
    </lsbrelease>
    <packages>
      <package name="linux-image-2.6.28-11-generic" id="200">
        <property name="installed_size" type="int">96530432</property>
      </package>
    </packages>
    <xorg version="1.6.0">
      <driver name="intel" version="2.6.3" class="X.Org Video Driver" device="2"/>
    </xorg>
  </software>
  <questions>
    <question name="detected_storage_controllers" plugin="find_storage_controllers">
      <target id="2">
        <driver>ahci</driver>
      </target>
      <command/>
      <answer type="multiple_choice">pass</answer>
      <answer_choices>
        <value type="str">fail</value>
        <value type="str">pass</value>
        <value type="str">skip</value>
      </answer_choices>
    </question>
  </questions>
</system>
"#;
