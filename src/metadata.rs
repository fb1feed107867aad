//! NetCDF structure inspection for the `inspect` command
//!
//! Lists dimensions and variables with the details needed to configure a
//! conversion: variable and dimension names, shapes for clip ranges, units
//! and fill values.

use crate::errors::{ConvertError, Result};
use netcdf::{AttributeValue, File, Variable};

/// Information about a dimension
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionInfo {
    pub name: String,
    pub length: usize,
    pub is_unlimited: bool,
}

/// Summary of one variable
#[derive(Debug, Clone, PartialEq)]
pub struct VariableInfo {
    pub name: String,
    pub data_type: String,
    pub dimensions: Vec<DimensionInfo>,
    pub units: Option<String>,
    pub long_name: Option<String>,
    pub fill_value: Option<f64>,
}

impl VariableInfo {
    pub fn shape(&self) -> Vec<usize> {
        self.dimensions.iter().map(|d| d.length).collect()
    }
}

/// Dimensions and variables of a file, sorted by name
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDescription {
    pub dimensions: Vec<DimensionInfo>,
    pub variables: Vec<VariableInfo>,
}

pub fn describe_source(file: &File) -> Result<SourceDescription> {
    let mut dimensions: Vec<DimensionInfo> = file
        .dimensions()
        .map(|d| DimensionInfo {
            name: d.name().to_string(),
            length: d.len(),
            is_unlimited: d.is_unlimited(),
        })
        .collect();
    dimensions.sort_by(|a, b| a.name.cmp(&b.name));

    let mut variables: Vec<VariableInfo> = file.variables().map(|v| describe(&v)).collect();
    variables.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(SourceDescription {
        dimensions,
        variables,
    })
}

/// Summary of a single variable.
pub fn describe_variable(file: &File, var_name: &str) -> Result<VariableInfo> {
    let var = file
        .variable(var_name)
        .ok_or_else(|| ConvertError::VariableNotFound {
            var: var_name.to_string(),
        })?;
    Ok(describe(&var))
}

fn describe(var: &Variable) -> VariableInfo {
    VariableInfo {
        name: var.name().to_string(),
        data_type: format!("{:?}", var.vartype()).to_lowercase(),
        dimensions: var
            .dimensions()
            .iter()
            .map(|d| DimensionInfo {
                name: d.name().to_string(),
                length: d.len(),
                is_unlimited: d.is_unlimited(),
            })
            .collect(),
        units: string_attribute(var, "units"),
        long_name: string_attribute(var, "long_name"),
        fill_value: var
            .attribute("_FillValue")
            .and_then(|a| a.value().ok())
            .and_then(|value| match value {
                AttributeValue::Double(v) => Some(v),
                AttributeValue::Float(v) => Some(f64::from(v)),
                AttributeValue::Int(v) => Some(f64::from(v)),
                AttributeValue::Short(v) => Some(f64::from(v)),
                _ => None,
            }),
    }
}

fn string_attribute(var: &Variable, name: &str) -> Option<String> {
    match var.attribute(name)?.value().ok()? {
        AttributeValue::Str(s) => Some(s),
        _ => None,
    }
}

/// Print a description in a clean, organized format.
pub fn print_description(description: &SourceDescription) {
    println!("\n Dimensions");
    println!("==============");
    if description.dimensions.is_empty() {
        println!("   (No dimensions found)");
    }
    for dim in &description.dimensions {
        if dim.is_unlimited {
            println!("    {} = {} (unlimited)", dim.name, dim.length);
        } else {
            println!("    {} = {}", dim.name, dim.length);
        }
    }

    println!("\n Variables");
    println!("=============");
    if description.variables.is_empty() {
        println!("   (No variables found)");
    }
    for var in &description.variables {
        print_variable(var);
    }

    println!("\n Tip: Use --clip <dimension>:<start>:<end> to select index ranges");
}

pub fn print_variable(var: &VariableInfo) {
    if var.dimensions.is_empty() {
        println!("    {} ({}): scalar", var.name, var.data_type);
    } else {
        let dims: Vec<&str> = var.dimensions.iter().map(|d| d.name.as_str()).collect();
        let shape: Vec<String> = var.shape().iter().map(|s| s.to_string()).collect();
        println!(
            "    {} ({}): [{}] = ({})",
            var.name,
            var.data_type,
            dims.join(", "),
            shape.join(" x ")
        );
    }

    let mut key_attrs = Vec::new();
    if let Some(units) = &var.units {
        key_attrs.push(format!("units: {}", units));
    }
    if let Some(long_name) = &var.long_name {
        key_attrs.push(format!("long_name: {}", long_name));
    }
    if let Some(fill) = var.fill_value {
        key_attrs.push(format!("_FillValue: {}", fill));
    }
    if !key_attrs.is_empty() {
        println!("      - {}", key_attrs.join(", "));
    }
}
