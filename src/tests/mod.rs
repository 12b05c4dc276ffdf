
mod class_hierarchy;
mod odex_rewrites;
mod opcode_tests;
mod partition_cases;
mod quickening_cases;
