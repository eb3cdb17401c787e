//! Static company information lookup.

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use super::{Tool, ToolError};

pub struct CompanyInfoTool;

#[async_trait]
impl Tool for CompanyInfoTool {
    fn name(&self) -> &'static str {
        "getCompanyInfo"
    }

    fn description(&self) -> &'static str {
        "Get information about SinCos Automation Technologies Ltd. company data."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn invoke(&self, _args: &Map<String, Value>) -> Result<Value, ToolError> {
        Ok(json!({
            "name": "SinCos Automation Technologies Ltd.",
            "description": "Leading energy technology company focused on smart grid solutions and renewable energy integration",
            "founded": "1983",
            "headquarters": "Dhaka, Bangladesh",
            "services": [
                "Smart Grid Technology",
                "Renewable Energy Integration",
                "Energy Storage Solutions",
                "Grid Monitoring & Analytics",
                "Demand Response Systems",
                "Microgrid Solutions"
            ],
            "products": [
                "GridSync Pro - Real-time Grid Monitoring",
                "EcoFlow - Renewable Energy Management",
                "PowerOptim - Energy Storage Systems",
                "SmartLoad - Demand Response Platform"
            ],
            "contact": {
                "email": "info@sincosbd.com",
                "phone": "+1 (555) 123-4567",
                "website": "https://www.sincosbd.com"
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_returns_company_profile() {
        let value = CompanyInfoTool.invoke(&Map::new()).await.unwrap();

        assert_eq!(value["name"], "SinCos Automation Technologies Ltd.");
        assert_eq!(value["services"].as_array().unwrap().len(), 6);
        assert_eq!(value["contact"]["email"], "info@sincosbd.com");
    }
}
