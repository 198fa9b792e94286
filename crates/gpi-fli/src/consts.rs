//! FLI constants used by the adapter, from `mti.h`, `acc_user.h` and
//! `acc_vhdl.h`.

// Region kinds (mti_GetRegionKind)
pub const ACC_MODULE: i32 = 20;
pub const ACC_ARCHITECTURE: i32 = 1001;
pub const ACC_ENTITY_VITAL_LEVEL0: i32 = 1002;
pub const ACC_ARCH_VITAL_LEVEL0: i32 = 1003;
pub const ACC_ARCH_VITAL_LEVEL1: i32 = 1004;
pub const ACC_FOREIGN_ARCH: i32 = 1005;
pub const ACC_FOREIGN_ARCH_MIXED: i32 = 1006;
pub const ACC_PACKAGE: i32 = 1101;
pub const ACC_CONFIGURATION: i32 = 1102;
pub const ACC_FOREIGN: i32 = 1103;
pub const ACC_BLOCK: i32 = 1110;
pub const ACC_GENERATE: i32 = 1111;
pub const ACC_IF_GENERATE: i32 = 1112;
pub const ACC_FOR_GENERATE: i32 = 1113;

// Type kinds (mtiTypeKindT)
pub const MTI_TYPE_SCALAR: i32 = 0;
pub const MTI_TYPE_ARRAY: i32 = 1;
pub const MTI_TYPE_RECORD: i32 = 2;
pub const MTI_TYPE_ENUM: i32 = 3;
pub const MTI_TYPE_PHYSICAL: i32 = 4;
pub const MTI_TYPE_REAL: i32 = 5;
pub const MTI_TYPE_ACCESS: i32 = 6;
pub const MTI_TYPE_FILE: i32 = 7;
pub const MTI_TYPE_TIME: i32 = 8;

// Process priorities (mtiProcessPriorityT)
pub const MTI_PROC_NORMAL: i32 = 0;
pub const MTI_PROC_IMMEDIATE: i32 = 1;
pub const MTI_PROC_POSTPONED: i32 = 2;
pub const MTI_PROC_NBA: i32 = 3;
pub const MTI_PROC_SYNCH: i32 = 4;

// Force types (mtiForceTypeT)
pub const MTI_FORCE_DEFAULT_TYPE: i32 = 0;
pub const MTI_FORCE_DEPOSIT: i32 = 1;
pub const MTI_FORCE_DRIVE: i32 = 2;
pub const MTI_FORCE_FREEZE: i32 = 3;

/// Literals of `std_ulogic`, in position order.
pub const STD_ULOGIC_LITERALS: [&str; 9] =
    ["'U'", "'X'", "'0'", "'1'", "'Z'", "'W'", "'L'", "'H'", "'-'"];

/// Literals of `bit`.
pub const BIT_LITERALS: [&str; 2] = ["'0'", "'1'"];

/// Literal count of `character`.
pub const CHARACTER_LITERALS: usize = 256;

pub fn region_kind_name(kind: i32) -> &'static str {
    match kind {
        ACC_MODULE => "accModule",
        ACC_ARCHITECTURE => "accArchitecture",
        ACC_ENTITY_VITAL_LEVEL0 => "accEntityVitalLevel0",
        ACC_ARCH_VITAL_LEVEL0 => "accArchVitalLevel0",
        ACC_ARCH_VITAL_LEVEL1 => "accArchVitalLevel1",
        ACC_FOREIGN_ARCH => "accForeignArch",
        ACC_FOREIGN_ARCH_MIXED => "accForeignArchMixed",
        ACC_PACKAGE => "accPackage",
        ACC_CONFIGURATION => "accConfiguration",
        ACC_FOREIGN => "accForeign",
        ACC_BLOCK => "accBlock",
        ACC_GENERATE => "accGenerate",
        ACC_IF_GENERATE => "accIfGenerate",
        ACC_FOR_GENERATE => "accForGenerate",
        _ => "unknown",
    }
}

pub fn priority_name(priority: i32) -> &'static str {
    match priority {
        MTI_PROC_NORMAL => "MTI_PROC_NORMAL",
        MTI_PROC_IMMEDIATE => "MTI_PROC_IMMEDIATE",
        MTI_PROC_POSTPONED => "MTI_PROC_POSTPONED",
        MTI_PROC_NBA => "MTI_PROC_NBA",
        MTI_PROC_SYNCH => "MTI_PROC_SYNCH",
        _ => "unknown",
    }
}
