//! VHPI constants used by the adapter, from `vhpi_user.h`.

// Class kinds (vhpiKindP)
pub const VHPI_UNDEFINED: i32 = -1;
pub const VHPI_ARRAY_TYPE_DECL_K: i32 = 1009;
pub const VHPI_BLOCK_STMT_K: i32 = 1017;
pub const VHPI_COMP_INST_STMT_K: i32 = 1024;
pub const VHPI_COND_SIG_ASSIGN_STMT_K: i32 = 1025;
pub const VHPI_CONST_DECL_K: i32 = 1028;
pub const VHPI_ENUM_TYPE_DECL_K: i32 = 1041;
pub const VHPI_FLOAT_TYPE_DECL_K: i32 = 1047;
pub const VHPI_FOR_GENERATE_K: i32 = 1048;
pub const VHPI_GENERIC_DECL_K: i32 = 1053;
pub const VHPI_IF_GENERATE_K: i32 = 1056;
pub const VHPI_INDEXED_NAME_K: i32 = 1059;
pub const VHPI_INT_RANGE_K: i32 = 1061;
pub const VHPI_INT_TYPE_DECL_K: i32 = 1062;
pub const VHPI_PACK_INST_K: i32 = 1074;
pub const VHPI_PORT_DECL_K: i32 = 1079;
pub const VHPI_PROCESS_STMT_K: i32 = 1082;
pub const VHPI_RECORD_TYPE_DECL_K: i32 = 1087;
pub const VHPI_ROOT_INST_K: i32 = 1090;
pub const VHPI_SELECT_SIG_ASSIGN_STMT_K: i32 = 1091;
pub const VHPI_SELECTED_NAME_K: i32 = 1093;
pub const VHPI_SIG_DECL_K: i32 = 1094;
pub const VHPI_SIMPLE_SIG_ASSIGN_STMT_K: i32 = 1097;
pub const VHPI_VAR_DECL_K: i32 = 1110;
pub const VHPI_CONC_ASSERT_STMT_K: i32 = 1117;
pub const VHPI_CONC_PROC_CALL_STMT_K: i32 = 1118;

// One-to-one relations
pub const VHPI_BASE_TYPE: i32 = 1306;
pub const VHPI_DESIGN_UNIT: i32 = 1321;
pub const VHPI_PRIMARY_UNIT: i32 = 1351;
pub const VHPI_ROOT_INST: i32 = 1361;
pub const VHPI_TOOL: i32 = 1371;
pub const VHPI_TYPE: i32 = 1372;
pub const VHPI_ELEM_TYPE: i32 = 1381;

// One-to-many relations
pub const VHPI_BLOCK_STMTS: i32 = 1506;
pub const VHPI_COMP_INST_STMTS: i32 = 1510;
pub const VHPI_CONST_DECLS: i32 = 1515;
pub const VHPI_CONSTRAINTS: i32 = 1516;
pub const VHPI_GENERIC_DECLS: i32 = 1530;
pub const VHPI_INDEXED_NAMES: i32 = 1532;
pub const VHPI_INTERNAL_REGIONS: i32 = 1533;
pub const VHPI_PORT_DECLS: i32 = 1539;
pub const VHPI_SELECTED_NAMES: i32 = 1542;
pub const VHPI_SIG_DECLS: i32 = 1546;
pub const VHPI_VAR_DECLS: i32 = 1555;

// Integer properties
pub const VHPI_IS_UP_P: i32 = 1040;
pub const VHPI_KIND_P: i32 = 1043;
pub const VHPI_LEFT_BOUND_P: i32 = 1044;
pub const VHPI_NUM_LITERALS_P: i32 = 1053;
pub const VHPI_RIGHT_BOUND_P: i32 = 1063;
pub const VHPI_SIZE_P: i32 = 1065;

// String properties
pub const VHPI_CASE_NAME_P: i32 = 1301;
pub const VHPI_FILE_NAME_P: i32 = 1304;
pub const VHPI_FULL_NAME_P: i32 = 1306;
pub const VHPI_NAME_P: i32 = 1313;
pub const VHPI_TOOL_VERSION_P: i32 = 1316;
pub const VHPI_UNIT_NAME_P: i32 = 1317;

// Physical properties
pub const VHPI_RESOLUTION_LIMIT_P: i32 = 1551;

// Value formats
pub const VHPI_BIN_STR_VAL: i32 = 1;
pub const VHPI_ENUM_VAL: i32 = 5;
pub const VHPI_INT_VAL: i32 = 6;
pub const VHPI_LOGIC_VAL: i32 = 7;
pub const VHPI_REAL_VAL: i32 = 8;
pub const VHPI_STR_VAL: i32 = 9;
pub const VHPI_CHAR_VAL: i32 = 10;
pub const VHPI_ENUM_VEC_VAL: i32 = 15;
pub const VHPI_LOGIC_VEC_VAL: i32 = 17;

// vhpi_put_value modes
pub const VHPI_DEPOSIT: i32 = 0;
pub const VHPI_DEPOSIT_PROPAGATE: i32 = 1;
pub const VHPI_FORCE_PROPAGATE: i32 = 3;
pub const VHPI_RELEASE: i32 = 4;

// vhpi_control operations
pub const VHPI_FINISH: i32 = 1;

// Callback reasons
pub const VHPI_CB_VALUE_CHANGE: i32 = 1001;
pub const VHPI_CB_AFTER_DELAY: i32 = 1010;
pub const VHPI_CB_NEXT_TIME_STEP: i32 = 1012;
pub const VHPI_CB_END_OF_PROCESSES: i32 = 1018;
pub const VHPI_CB_LAST_KNOWN_DELTA_CYCLE: i32 = 1020;
pub const VHPI_CB_START_OF_SIMULATION: i32 = 1034;
pub const VHPI_CB_END_OF_SIMULATION: i32 = 1035;

// Severities reported by vhpi_check_error
pub const VHPI_NOTE: i32 = 1;
pub const VHPI_WARNING: i32 = 2;
pub const VHPI_ERROR: i32 = 3;
pub const VHPI_SYSTEM: i32 = 4;
pub const VHPI_INTERNAL: i32 = 5;
pub const VHPI_FAILURE: i32 = 6;

/// Readable name of a callback reason for log messages.
pub fn reason_name(reason: i32) -> &'static str {
    match reason {
        VHPI_CB_VALUE_CHANGE => "vhpiCbValueChange",
        VHPI_CB_AFTER_DELAY => "vhpiCbAfterDelay",
        VHPI_CB_NEXT_TIME_STEP => "vhpiCbNextTimeStep",
        VHPI_CB_END_OF_PROCESSES => "vhpiCbEndOfProcesses",
        VHPI_CB_LAST_KNOWN_DELTA_CYCLE => "vhpiCbLastKnownDeltaCycle",
        VHPI_CB_START_OF_SIMULATION => "vhpiCbStartOfSimulation",
        VHPI_CB_END_OF_SIMULATION => "vhpiCbEndOfSimulation",
        _ => "unknown",
    }
}
